use std::sync::Arc;

use chrono::{DateTime, Utc};
use convoy_kvstore::KvStore;
use serde::Serialize;
use tracing::warn;

/// Outcome of a quota admission check or peek (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl QuotaDecision {
    fn allowed(remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_at,
        }
    }

    fn rejected(reset_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
        }
    }
}

/// Per-organization token-bucket rate limiter over a shared KV store
/// (§4.D). Scope is strictly per organization, never per user — two
/// independent orgs never share bucket state.
pub struct QuotaEngine {
    kv: Arc<dyn KvStore>,
    capacity: f64,
    refill_rate: f64,
    ttl_secs: u64,
}

impl QuotaEngine {
    pub fn new(kv: Arc<dyn KvStore>, capacity: f64, refill_rate: f64, ttl_secs: u64) -> Self {
        Self {
            kv,
            capacity,
            refill_rate,
            ttl_secs,
        }
    }

    fn tokens_key(org_id: &str) -> String {
        format!("ratelimit:{org_id}:tokens")
    }

    fn last_refill_key(org_id: &str) -> String {
        format!("ratelimit:{org_id}:last_refill")
    }

    /// Refills the stored pair up to `now` and returns the new token level
    /// alongside the timestamp it was computed from. Pure arithmetic, no
    /// I/O — kept separate from `check`/`peek` so it is directly
    /// unit-testable against the closed-form refill formula (§8 "Quota
    /// monotonicity").
    fn refill(&self, tokens: f64, last_refill_ms: i64, now_ms: i64) -> f64 {
        let elapsed_secs = ((now_ms - last_refill_ms).max(0) as f64) / 1000.0;
        (tokens + elapsed_secs * self.refill_rate).min(self.capacity)
    }

    fn reset_at_for(&self, tokens_after: f64, now: DateTime<Utc>) -> DateTime<Utc> {
        let deficit = (self.capacity - tokens_after).max(0.0);
        let secs = deficit / self.refill_rate;
        now + chrono::Duration::milliseconds((secs * 1000.0) as i64)
    }

    fn reset_at_for_rejected(&self, tokens: f64, now: DateTime<Utc>) -> DateTime<Utc> {
        let deficit = (1.0 - tokens).max(0.0);
        let secs = deficit / self.refill_rate;
        now + chrono::Duration::milliseconds((secs * 1000.0) as i64)
    }

    /// Admission check (§4.D steps 1-4). On KV unavailability, fails open:
    /// returns allowed with a full bucket and logs — availability over
    /// strict enforcement.
    pub async fn check(&self, org_id: &str) -> QuotaDecision {
        self.checked_at(org_id, Utc::now()).await
    }

    /// Same algorithm as `check` but takes an explicit `now`, so tests can
    /// drive the refill formula without sleeping.
    pub async fn checked_at(&self, org_id: &str, now: DateTime<Utc>) -> QuotaDecision {
        let pair = self
            .kv
            .get_pair(&Self::tokens_key(org_id), &Self::last_refill_key(org_id))
            .await;

        let (tokens_str, last_refill_str) = match pair {
            Ok(p) => p,
            Err(e) => {
                warn!(%org_id, error = %e, "quota kv read failed, failing open");
                return QuotaDecision::allowed(self.capacity as u64, now + one_window(self));
            }
        };

        let (tokens, last_refill_ms) = parse_pair(&tokens_str, &last_refill_str, self.capacity, now);
        let refilled = self.refill(tokens, last_refill_ms, now.timestamp_millis());

        if refilled >= 1.0 {
            let remaining = refilled - 1.0;
            let set_result = self
                .kv
                .set(
                    &Self::tokens_key(org_id),
                    &format!("{remaining}"),
                    self.ttl_secs,
                )
                .await
                .and(
                    self.kv
                        .set(
                            &Self::last_refill_key(org_id),
                            &now.timestamp_millis().to_string(),
                            self.ttl_secs,
                        )
                        .await,
                );
            if let Err(e) = set_result {
                warn!(%org_id, error = %e, "quota kv write failed, failing open");
                return QuotaDecision::allowed(self.capacity as u64, now + one_window(self));
            }
            QuotaDecision::allowed(remaining.floor() as u64, self.reset_at_for(remaining, now))
        } else {
            QuotaDecision::rejected(self.reset_at_for_rejected(refilled, now))
        }
    }

    /// Read-only variant: same refill computation, never mutates storage
    /// (§4.D "peek").
    pub async fn peek(&self, org_id: &str) -> QuotaDecision {
        self.peeked_at(org_id, Utc::now()).await
    }

    pub async fn peeked_at(&self, org_id: &str, now: DateTime<Utc>) -> QuotaDecision {
        let pair = self
            .kv
            .get_pair(&Self::tokens_key(org_id), &Self::last_refill_key(org_id))
            .await;

        let (tokens_str, last_refill_str) = match pair {
            Ok(p) => p,
            Err(e) => {
                warn!(%org_id, error = %e, "quota kv read failed on peek, failing open");
                return QuotaDecision::allowed(self.capacity as u64, now + one_window(self));
            }
        };

        let (tokens, last_refill_ms) = parse_pair(&tokens_str, &last_refill_str, self.capacity, now);
        let refilled = self.refill(tokens, last_refill_ms, now.timestamp_millis());

        if refilled >= 1.0 {
            QuotaDecision::allowed(refilled.floor() as u64, self.reset_at_for(refilled, now))
        } else {
            QuotaDecision::rejected(self.reset_at_for_rejected(refilled, now))
        }
    }
}

fn one_window(engine: &QuotaEngine) -> chrono::Duration {
    chrono::Duration::milliseconds(((1.0 / engine.refill_rate) * 1000.0) as i64)
}

/// Parses the stored `(tokens, last_refill)` pair, seeding `(capacity, now)`
/// when either key is missing — covers both "never seen this org" and a
/// just-evicted TTL key, per §4.D step 1.
fn parse_pair(
    tokens_str: &Option<String>,
    last_refill_str: &Option<String>,
    capacity: f64,
    now: DateTime<Utc>,
) -> (f64, i64) {
    match (tokens_str, last_refill_str) {
        (Some(t), Some(l)) => {
            let tokens = t.parse::<f64>().unwrap_or(capacity);
            let last_refill_ms = l.parse::<i64>().unwrap_or_else(|_| now.timestamp_millis());
            (tokens, last_refill_ms)
        }
        _ => (capacity, now.timestamp_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_kvstore::error::KvError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeKv {
        store: tokio::sync::Mutex<std::collections::HashMap<String, String>>,
        always_fail: AtomicBool,
    }

    impl FakeKv {
        fn new() -> Self {
            Self {
                store: tokio::sync::Mutex::new(std::collections::HashMap::new()),
                always_fail: AtomicBool::new(false),
            }
        }

        fn failing() -> Self {
            let kv = Self::new();
            kv.always_fail.store(true, Ordering::SeqCst);
            kv
        }
    }

    #[async_trait::async_trait]
    impl KvStore for FakeKv {
        async fn get(&self, key: &str) -> convoy_kvstore::error::Result<Option<String>> {
            if self.always_fail.load(Ordering::SeqCst) {
                return Err(KvError::Database(rusqlite::Error::QueryReturnedNoRows));
            }
            Ok(self.store.lock().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str, _ttl_seconds: u64) -> convoy_kvstore::error::Result<()> {
            if self.always_fail.load(Ordering::SeqCst) {
                return Err(KvError::Database(rusqlite::Error::QueryReturnedNoRows));
            }
            self.store.lock().await.insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> convoy_kvstore::error::Result<()> {
            self.store.lock().await.remove(key);
            Ok(())
        }

        async fn ping(&self) -> convoy_kvstore::error::Result<()> {
            Ok(())
        }
    }

    fn engine(kv: Arc<dyn KvStore>) -> QuotaEngine {
        QuotaEngine::new(kv, 20.0, 1.0, 60)
    }

    #[tokio::test]
    async fn first_requests_up_to_capacity_are_allowed() {
        let e = engine(Arc::new(FakeKv::new()));
        let now = Utc::now();
        for _ in 0..20 {
            let d = e.checked_at("org-a", now).await;
            assert!(d.allowed);
        }
        let rejected = e.checked_at("org-a", now).await;
        assert!(!rejected.allowed);
        assert!(rejected.reset_at > now);
    }

    #[tokio::test]
    async fn idle_refill_matches_closed_form() {
        let e = engine(Arc::new(FakeKv::new()));
        let t0 = Utc::now();
        // Drain the bucket to 0 debits remaining (after 20 debits, ~0 tokens left).
        for _ in 0..20 {
            e.checked_at("org-a", t0).await;
        }
        let t1 = t0 + chrono::Duration::seconds(5);
        let d = e.peeked_at("org-a", t1).await;
        // After draining to 0, 5s at 1 token/s should refill to ~5.
        assert_eq!(d.remaining, 5);
    }

    #[tokio::test]
    async fn two_orgs_are_independent() {
        let e = engine(Arc::new(FakeKv::new()));
        let now = Utc::now();
        for _ in 0..20 {
            e.checked_at("org-a", now).await;
        }
        assert!(!e.checked_at("org-a", now).await.allowed);
        assert!(e.checked_at("org-b", now).await.allowed);
    }

    #[tokio::test]
    async fn kv_failure_fails_open() {
        let e = engine(Arc::new(FakeKv::failing()));
        let d = e.check("org-a").await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 20);
    }
}
