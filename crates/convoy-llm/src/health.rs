use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Rolling window over which provider success/failure is measured.
const WINDOW_SECS: u64 = 300;

/// Provider health classification surfaced on `/health` (SPEC_FULL
/// "Provider health snapshot"). Informational only — never gates a
/// request, unlike the quota engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Degraded,
    Down,
    Unknown,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Degraded => write!(f, "degraded"),
            Self::Down => write!(f, "down"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealthEntry {
    pub name: String,
    pub status: ProviderStatus,
    pub avg_latency_ms: u64,
    pub requests_ok: u32,
    pub requests_err: u32,
    pub total_requests: u64,
}

struct InternalEntry {
    window: VecDeque<(Instant, bool, u64)>,
    total_requests: u64,
}

impl InternalEntry {
    fn new() -> Self {
        Self {
            window: VecDeque::new(),
            total_requests: 0,
        }
    }

    fn prune(&mut self) {
        let cutoff = Instant::now() - Duration::from_secs(WINDOW_SECS);
        while self.window.front().is_some_and(|(t, _, _)| *t < cutoff) {
            self.window.pop_front();
        }
    }

    fn status(&self) -> ProviderStatus {
        if self.window.is_empty() {
            return ProviderStatus::Unknown;
        }
        let total = self.window.len() as f64;
        let ok = self.window.iter().filter(|(_, ok, _)| *ok).count() as f64;
        let rate = ok / total;
        if rate > 0.8 {
            ProviderStatus::Ok
        } else if rate >= 0.5 {
            ProviderStatus::Degraded
        } else {
            ProviderStatus::Down
        }
    }

    fn avg_latency_ms(&self) -> u64 {
        if self.window.is_empty() {
            return 0;
        }
        let sum: u64 = self.window.iter().map(|(_, _, lat)| lat).sum();
        sum / self.window.len() as u64
    }

    fn to_entry(&self, name: &str) -> ProviderHealthEntry {
        ProviderHealthEntry {
            name: name.to_string(),
            status: self.status(),
            avg_latency_ms: self.avg_latency_ms(),
            requests_ok: self.window.iter().filter(|(_, ok, _)| *ok).count() as u32,
            requests_err: self.window.iter().filter(|(_, ok, _)| !*ok).count() as u32,
            total_requests: self.total_requests,
        }
    }
}

/// Passive, request-driven health tracker for the configured provider set
/// (primary/fallback/local). Grounded in the teacher's
/// `skynet_agent::health::HealthTracker`, trimmed to the statuses this
/// workspace's `ProviderError` taxonomy actually distinguishes — no
/// auth-expiry or rate-limit override, since §4.G's taxonomy has no
/// equivalent variant.
pub struct HealthTracker {
    entries: DashMap<String, InternalEntry>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.prune();
        entry.window.push_back((Instant::now(), true, latency_ms));
        entry.total_requests += 1;
    }

    pub fn record_error(&self, provider: &str) {
        let mut entry = self.entries.entry(provider.to_string()).or_insert_with(InternalEntry::new);
        entry.prune();
        entry.window.push_back((Instant::now(), false, 0));
        entry.total_requests += 1;
    }

    pub fn all_entries(&self) -> Vec<ProviderHealthEntry> {
        self.entries.iter().map(|e| e.value().to_entry(e.key())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_successes_report_ok() {
        let tracker = HealthTracker::new();
        for _ in 0..5 {
            tracker.record_success("local", 20);
        }
        let entries = tracker.all_entries();
        assert_eq!(entries[0].status, ProviderStatus::Ok);
        assert_eq!(entries[0].avg_latency_ms, 20);
    }

    #[test]
    fn mostly_errors_report_down() {
        let tracker = HealthTracker::new();
        for _ in 0..9 {
            tracker.record_error("claude");
        }
        tracker.record_success("claude", 5);
        let entries = tracker.all_entries();
        assert_eq!(entries[0].status, ProviderStatus::Down);
    }
}
