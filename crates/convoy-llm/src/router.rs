use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{ProviderError, Result};
use crate::health::HealthTracker;
use crate::stream::{StreamEvent, StreamOptions};
use crate::types::{ChatOutcome, Message};
use crate::LlmProvider;

/// One entry in the fallback chain: a provider plus its own retry budget.
/// Copied and adapted from `skynet_agent::router::ProviderSlot` —
/// structure kept verbatim.
pub struct ProviderSlot {
    pub provider: Box<dyn LlmProvider>,
    pub max_retries: u32,
}

impl ProviderSlot {
    pub fn new(provider: Box<dyn LlmProvider>, max_retries: u32) -> Self {
        Self { provider, max_retries }
    }
}

/// Fallback chain: a primary slot and optional fallback slot (§4.G,
/// §9 "The fallback chain is data, not inheritance"). Behavioral
/// difference from the teacher's `ProviderRouter`: `stream_chat` never
/// fails over to the next slot once any `TextDelta` has reached the
/// channel — the teacher's domain has no half-delivered remote client
/// response to protect, this one does (§4.G, §7 "do not retry, do not
/// attempt fallback provider").
pub struct ProviderRouter {
    slots: Vec<ProviderSlot>,
    health: Option<Arc<HealthTracker>>,
}

impl ProviderRouter {
    pub fn new(slots: Vec<ProviderSlot>) -> Self {
        assert!(!slots.is_empty(), "ProviderRouter requires at least one provider slot");
        Self { slots, health: None }
    }

    /// Same as `new`, but every chat/stream attempt is recorded against
    /// `tracker` so `/health` can report per-provider status (§4.G).
    pub fn with_health_tracker(slots: Vec<ProviderSlot>, tracker: Arc<HealthTracker>) -> Self {
        assert!(!slots.is_empty(), "ProviderRouter requires at least one provider slot");
        Self { slots, health: Some(tracker) }
    }

    /// Which provider actually served the call, alongside the outcome —
    /// `chat_with_fallback` "surfaces which provider served the call"
    /// (§4.G). The bool is returned alongside both the success and the
    /// failure outcome (rather than only on success) so a caller mapping
    /// a total failure to `ApiError::Upstream` can report whether a
    /// fallback slot was actually tried, per §7 "includes whether
    /// fallback was attempted" — it is true as soon as the loop moves
    /// past the primary slot, regardless of how the call ultimately ends.
    pub async fn chat_with_fallback(
        &self,
        messages: &[Message],
        prompt_name: &str,
    ) -> (std::result::Result<ChatOutcome, ProviderError>, bool) {
        let mut last_err: Option<ProviderError> = None;
        let mut fallback_attempted = false;

        for (idx, slot) in self.slots.iter().enumerate() {
            if idx > 0 {
                fallback_attempted = true;
            }
            let name = slot.provider.name();
            for attempt in 0..=slot.max_retries {
                let started = Instant::now();
                match slot.provider.chat(messages, prompt_name).await {
                    Ok(outcome) => {
                        if let Some(tracker) = &self.health {
                            tracker.record_success(name, started.elapsed().as_millis() as u64);
                        }
                        if idx > 0 {
                            info!(provider = %name, "served by fallback provider");
                        }
                        return (Ok(outcome), fallback_attempted);
                    }
                    Err(e) => {
                        if let Some(tracker) = &self.health {
                            tracker.record_error(name);
                        }
                        warn!(provider = %name, attempt, error = %e, "provider chat failed");
                        let retriable = e.is_retriable();
                        last_err = Some(e);
                        if !retriable {
                            break;
                        }
                        if attempt < slot.max_retries {
                            tokio::time::sleep(std::time::Duration::from_millis(
                                200 * (attempt as u64 + 1),
                            ))
                            .await;
                        }
                    }
                }
            }
        }

        (
            Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".into()))),
            fallback_attempted,
        )
    }

    /// Streaming fallback is symmetric, except it only activates before any
    /// token has been emitted on the channel (§4.G, §7). Once the first
    /// `TextDelta` lands, a mid-stream failure is surfaced as an `Error`
    /// event on the same channel, not retried against the next slot.
    pub async fn stream_chat_with_fallback(
        &self,
        messages: &[Message],
        opts: StreamOptions,
    ) -> Result<()> {
        let mut last_err: Option<ProviderError> = None;

        for (idx, slot) in self.slots.iter().enumerate() {
            let name = slot.provider.name();
            let started = Instant::now();
            let (probe_tx, mut probe_rx) = tokio::sync::mpsc::channel::<StreamEvent>(64);
            let forward_opts = StreamOptions {
                correlation_id: opts.correlation_id.clone(),
                prompt_name: opts.prompt_name.clone(),
                tx: probe_tx,
            };

            let provider = &slot.provider;
            let stream_fut = provider.stream_chat(messages, forward_opts);
            tokio::pin!(stream_fut);

            let mut first_token_emitted = false;
            let result = loop {
                tokio::select! {
                    biased;
                    maybe_event = probe_rx.recv() => {
                        match maybe_event {
                            Some(event) => {
                                if matches!(event, StreamEvent::TextDelta { .. }) {
                                    first_token_emitted = true;
                                }
                                if opts.tx.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                            None => {}
                        }
                    }
                    res = &mut stream_fut => {
                        break res;
                    }
                }
            };

            match result {
                Ok(()) => {
                    if let Some(tracker) = &self.health {
                        tracker.record_success(name, started.elapsed().as_millis() as u64);
                    }
                    if idx > 0 {
                        info!(provider = %name, "stream served by fallback provider");
                    }
                    return Ok(());
                }
                Err(e) => {
                    if let Some(tracker) = &self.health {
                        tracker.record_error(name);
                    }
                    warn!(provider = %name, error = %e, first_token_emitted, "provider stream_chat failed");
                    if first_token_emitted {
                        let _ = opts
                            .tx
                            .send(StreamEvent::Error { message: e.to_string() })
                            .await;
                        return Err(e);
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all providers failed".into())))
    }
}

#[async_trait]
impl LlmProvider for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn chat(&self, messages: &[Message], prompt_name: &str) -> Result<ChatOutcome> {
        self.chat_with_fallback(messages, prompt_name).await.0
    }

    async fn stream_chat(&self, messages: &[Message], opts: StreamOptions) -> Result<()> {
        self.stream_chat_with_fallback(messages, opts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use async_trait::async_trait;

    struct AlwaysFail;
    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn chat(&self, _messages: &[Message], _prompt_name: &str) -> Result<ChatOutcome> {
            Err(ProviderError::Unavailable("nope".into()))
        }
        async fn stream_chat(&self, _messages: &[Message], opts: StreamOptions) -> Result<()> {
            let _ = opts;
            Err(ProviderError::Unavailable("nope".into()))
        }
    }

    struct AlwaysOk;
    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        async fn chat(&self, _messages: &[Message], _prompt_name: &str) -> Result<ChatOutcome> {
            Ok(ChatOutcome {
                text: "ok".into(),
                usage: crate::types::Usage { input_tokens: 1, output_tokens: 1 },
                provider_name: "always-ok".into(),
            })
        }
        async fn stream_chat(&self, _messages: &[Message], opts: StreamOptions) -> Result<()> {
            opts.tx.send(StreamEvent::TextDelta { text: "ok".into() }).await.ok();
            opts.tx
                .send(StreamEvent::Done { tokens_in: 1, tokens_out: 1, stop_reason: "stop".into() })
                .await
                .ok();
            Ok(())
        }
    }

    /// Fails only after emitting one token, to exercise the
    /// no-fallback-after-first-token rule.
    struct FailsAfterFirstToken;
    #[async_trait]
    impl LlmProvider for FailsAfterFirstToken {
        fn name(&self) -> &str {
            "fails-after-first-token"
        }
        async fn chat(&self, _messages: &[Message], _prompt_name: &str) -> Result<ChatOutcome> {
            Err(ProviderError::Unavailable("nope".into()))
        }
        async fn stream_chat(&self, _messages: &[Message], opts: StreamOptions) -> Result<()> {
            opts.tx
                .send(StreamEvent::TextDelta { text: "partial".into() })
                .await
                .ok();
            Err(ProviderError::Unavailable("mid-stream failure".into()))
        }
    }

    fn msgs() -> Vec<Message> {
        vec![Message { role: Role::User, content: "hi".into() }]
    }

    #[tokio::test]
    async fn chat_falls_back_to_second_provider() {
        let router = ProviderRouter::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 0),
            ProviderSlot::new(Box::new(AlwaysOk), 0),
        ]);
        let (result, used_fallback) = router.chat_with_fallback(&msgs(), "chat").await;
        assert_eq!(result.unwrap().text, "ok");
        assert!(used_fallback);
    }

    #[tokio::test]
    async fn chat_errors_when_all_fail() {
        let router = ProviderRouter::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 0),
            ProviderSlot::new(Box::new(AlwaysFail), 0),
        ]);
        let (result, used_fallback) = router.chat_with_fallback(&msgs(), "chat").await;
        assert!(result.is_err());
        assert!(used_fallback);
    }

    #[tokio::test]
    async fn chat_reports_no_fallback_attempted_for_single_slot_failure() {
        let router = ProviderRouter::new(vec![ProviderSlot::new(Box::new(AlwaysFail), 0)]);
        let (result, used_fallback) = router.chat_with_fallback(&msgs(), "chat").await;
        assert!(result.is_err());
        assert!(!used_fallback);
    }

    #[tokio::test]
    async fn stream_does_not_fail_over_after_first_token() {
        let router = ProviderRouter::new(vec![
            ProviderSlot::new(Box::new(FailsAfterFirstToken), 0),
            ProviderSlot::new(Box::new(AlwaysOk), 0),
        ]);
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let opts = StreamOptions {
            correlation_id: "c1".into(),
            prompt_name: "chat".into(),
            tx,
        };
        let result = router.stream_chat_with_fallback(&msgs(), opts).await;
        assert!(result.is_err());

        let mut saw_partial = false;
        let mut saw_error = false;
        let mut saw_ok_token = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta { text } if text == "partial" => saw_partial = true,
                StreamEvent::TextDelta { text } if text == "ok" => saw_ok_token = true,
                StreamEvent::Error { .. } => saw_error = true,
                _ => {}
            }
        }
        assert!(saw_partial);
        assert!(saw_error);
        assert!(!saw_ok_token, "must not fail over once a token was emitted");
    }

    #[tokio::test]
    async fn stream_falls_back_before_any_token() {
        let router = ProviderRouter::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 0),
            ProviderSlot::new(Box::new(AlwaysOk), 0),
        ]);
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let opts = StreamOptions {
            correlation_id: "c1".into(),
            prompt_name: "chat".into(),
            tx,
        };
        let result = router.stream_chat_with_fallback(&msgs(), opts).await;
        assert!(result.is_ok());
        let mut saw_ok_token = false;
        while let Some(event) = rx.recv().await {
            if let StreamEvent::TextDelta { text } = event {
                if text == "ok" {
                    saw_ok_token = true;
                }
            }
        }
        assert!(saw_ok_token);
    }
}
