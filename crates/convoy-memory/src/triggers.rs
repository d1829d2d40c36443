use chrono::{DateTime, Utc};
use convoy_repository::types::Summary;

/// Message-count/token-threshold/24h-suppression-with-delta-override rule
/// (§4.F). Pure so it can be unit tested without a database.
///
/// Re-summarization fires when either threshold is crossed, unless the
/// latest summary is less than 24h old — in which case it still fires if
/// the number of messages accumulated since that summary exceeds
/// `resummarize_delta`.
#[allow(clippy::too_many_arguments)]
pub fn should_summarize(
    total_messages: u32,
    total_tokens: u64,
    messages_since_summary: u32,
    latest_summary: Option<&Summary>,
    now: DateTime<Utc>,
    message_count_threshold: u32,
    token_threshold: u64,
    resummarize_delta: u32,
) -> bool {
    let crosses_threshold = total_messages > message_count_threshold || total_tokens > token_threshold;
    if !crosses_threshold {
        return false;
    }

    let Some(summary) = latest_summary else {
        return true;
    };

    let created_at: DateTime<Utc> = match DateTime::parse_from_rfc3339(&summary.created_at) {
        Ok(t) => t.with_timezone(&Utc),
        Err(_) => return true,
    };

    let age = now.signed_duration_since(created_at);
    if age >= chrono::Duration::hours(24) {
        return true;
    }

    messages_since_summary > resummarize_delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_at(created_at: &str) -> Summary {
        Summary {
            id: "sum-1".into(),
            chat_id: "chat-1".into(),
            summary_text: "...".into(),
            start_message_id: "m-1".into(),
            end_message_id: "m-2".into(),
            covered_message_count: 50,
            original_tokens: 3000,
            summary_tokens: 400,
            compression_ratio: 7.5,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn below_threshold_never_fires() {
        let now = Utc::now();
        assert!(!should_summarize(10, 500, 0, None, now, 50, 6_000, 20));
    }

    #[test]
    fn no_prior_summary_fires_once_threshold_crossed() {
        let now = Utc::now();
        assert!(should_summarize(60, 900, 0, None, now, 50, 6_000, 20));
    }

    #[test]
    fn recent_summary_suppresses_unless_delta_exceeded() {
        let now = Utc::now();
        let recent = summary_at(&now.to_rfc3339());
        assert!(!should_summarize(60, 900, 5, Some(&recent), now, 50, 6_000, 20));
        assert!(should_summarize(60, 900, 25, Some(&recent), now, 50, 6_000, 20));
    }

    #[test]
    fn stale_summary_fires_regardless_of_delta() {
        let now = Utc::now();
        let stale_created = now - chrono::Duration::hours(25);
        let stale = summary_at(&stale_created.to_rfc3339());
        assert!(should_summarize(60, 900, 1, Some(&stale), now, 50, 6_000, 20));
    }
}
