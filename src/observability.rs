//! Observability: tracing setup and in-process metrics

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins over the configured level. Calling this twice is harmless.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_pushed: AtomicU64,
    jobs_reserved: AtomicU64,
    jobs_released: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_remembered: AtomicU64,
    invalid_transitions: AtomicU64,
    entries_trimmed: AtomicU64,
    entries_healed: AtomicU64,
    timeouts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_pushed(&self) {
        self.jobs_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_reserved(&self) {
        self.jobs_reserved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_released(&self) {
        self.jobs_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_remembered(&self) {
        self.jobs_remembered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_transition(&self) {
        self.invalid_transitions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "invalid_transitions", "Metric incremented");
    }

    pub fn entries_trimmed(&self, count: usize) {
        self.entries_trimmed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn entry_healed(&self) {
        self.entries_healed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "entries_healed", "Metric incremented");
    }

    pub fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "timeouts", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_pushed: self.jobs_pushed.load(Ordering::Relaxed),
            jobs_reserved: self.jobs_reserved.load(Ordering::Relaxed),
            jobs_released: self.jobs_released.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_remembered: self.jobs_remembered.load(Ordering::Relaxed),
            invalid_transitions: self.invalid_transitions.load(Ordering::Relaxed),
            entries_trimmed: self.entries_trimmed.load(Ordering::Relaxed),
            entries_healed: self.entries_healed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_pushed: u64,
    pub jobs_reserved: u64,
    pub jobs_released: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_remembered: u64,
    pub invalid_transitions: u64,
    pub entries_trimmed: u64,
    pub entries_healed: u64,
    pub timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = Metrics::new();
        metrics.job_pushed();
        metrics.job_pushed();
        metrics.job_failed();
        metrics.entries_trimmed(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_pushed, 2);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.entries_trimmed, 5);
        assert_eq!(snapshot.timeouts, 0);
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        let config = TelemetryConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}
