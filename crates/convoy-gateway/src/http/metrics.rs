use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::State;

use convoy_llm::health::ProviderStatus;

use crate::app::AppState;

fn status_value(status: ProviderStatus) -> u8 {
    match status {
        ProviderStatus::Ok => 1,
        ProviderStatus::Degraded => 0,
        ProviderStatus::Down => 0,
        ProviderStatus::Unknown => 0,
    }
}

/// GET /metrics — plain-text Prometheus exposition (§6, supplemented
/// ambient concern). Grounded in `mofa_monitoring::dashboard::prometheus`'s
/// `# HELP`/`# TYPE` line shape, scaled down to this workspace's single
/// metrics source: per-provider health (§9 "polymorphism over the LLM
/// provider set").
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# HELP convoy_provider_up Whether a provider's rolling health window is Ok (1) or not (0).");
    let _ = writeln!(out, "# TYPE convoy_provider_up gauge");
    for entry in state.health.all_entries() {
        let _ = writeln!(out, "convoy_provider_up{{provider=\"{}\"}} {}", entry.name, status_value(entry.status));
    }

    let _ = writeln!(out, "# HELP convoy_provider_avg_latency_ms Rolling average latency per provider, milliseconds.");
    let _ = writeln!(out, "# TYPE convoy_provider_avg_latency_ms gauge");
    for entry in state.health.all_entries() {
        let _ = writeln!(out, "convoy_provider_avg_latency_ms{{provider=\"{}\"}} {}", entry.name, entry.avg_latency_ms);
    }

    let _ = writeln!(out, "# HELP convoy_provider_requests_total Requests observed per provider, by outcome.");
    let _ = writeln!(out, "# TYPE convoy_provider_requests_total counter");
    for entry in state.health.all_entries() {
        let _ = writeln!(
            out,
            "convoy_provider_requests_total{{provider=\"{}\",outcome=\"ok\"}} {}",
            entry.name, entry.requests_ok
        );
        let _ = writeln!(
            out,
            "convoy_provider_requests_total{{provider=\"{}\",outcome=\"error\"}} {}",
            entry.name, entry.requests_err
        );
    }

    out
}
