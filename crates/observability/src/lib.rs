use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Process-wide request counters. Every increment is mirrored to the `metrics`
/// facade so an installed exporter sees the same numbers as `snapshot()`.
#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    safety_actions_total: AtomicU64,
    transfers_committed_total: AtomicU64,
    transfers_rejected_total: AtomicU64,
    missing_entity_total: AtomicU64,
    retrieval_answered_total: AtomicU64,
    retrieval_miss_total: AtomicU64,
    adapter_failures_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub safety_actions_total: u64,
    pub transfers_committed_total: u64,
    pub transfers_rejected_total: u64,
    pub missing_entity_total: u64,
    pub retrieval_answered_total: u64,
    pub retrieval_miss_total: u64,
    pub adapter_failures_total: u64,
    pub avg_latency_millis: f64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        bump(&self.requests_total, "teller_requests_total");
    }

    pub fn inc_safety_action(&self) {
        bump(&self.safety_actions_total, "teller_safety_actions_total");
    }

    pub fn inc_transfer_committed(&self) {
        bump(&self.transfers_committed_total, "teller_transfers_committed_total");
    }

    pub fn inc_transfer_rejected(&self) {
        bump(&self.transfers_rejected_total, "teller_transfers_rejected_total");
    }

    pub fn inc_missing_entity(&self) {
        bump(&self.missing_entity_total, "teller_missing_entity_total");
    }

    pub fn inc_retrieval_answered(&self) {
        bump(&self.retrieval_answered_total, "teller_retrieval_answered_total");
    }

    pub fn inc_retrieval_miss(&self) {
        bump(&self.retrieval_miss_total, "teller_retrieval_miss_total");
    }

    pub fn inc_adapter_failure(&self) {
        bump(&self.adapter_failures_total, "teller_adapter_failures_total");
    }

    pub fn observe_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        metrics::histogram!("teller_request_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            safety_actions_total: self.safety_actions_total.load(Ordering::Relaxed),
            transfers_committed_total: self.transfers_committed_total.load(Ordering::Relaxed),
            transfers_rejected_total: self.transfers_rejected_total.load(Ordering::Relaxed),
            missing_entity_total: self.missing_entity_total.load(Ordering::Relaxed),
            retrieval_answered_total: self.retrieval_answered_total.load(Ordering::Relaxed),
            retrieval_miss_total: self.retrieval_miss_total.load(Ordering::Relaxed),
            adapter_failures_total: self.adapter_failures_total.load(Ordering::Relaxed),
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
        }
    }
}

fn bump(counter: &AtomicU64, name: &'static str) {
    counter.fetch_add(1, Ordering::Relaxed);
    metrics::counter!(name).increment(1);
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,teller_agents=info,teller_storage=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_latency_over_requests() {
        let metrics = AppMetrics::default();
        metrics.inc_request();
        metrics.inc_request();
        metrics.inc_transfer_committed();
        metrics.observe_latency(Duration::from_millis(30));
        metrics.observe_latency(Duration::from_millis(10));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.transfers_committed_total, 1);
        assert!((snapshot.avg_latency_millis - 20.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["retrieval_miss_total"], 0);
    }
}
