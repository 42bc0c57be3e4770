use crate::envelope::{ErrorKind, ResultEnvelope, Status};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-process counters for dispatch outcomes.
#[derive(Default)]
pub struct GatewayMetrics {
    dispatches: AtomicU64,
    executions: AtomicU64,
    successes: AtomicU64,
    denials: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_dispatches(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, envelope: &ResultEnvelope) {
        match envelope.status {
            Status::Success => {
                self.successes.fetch_add(1, Ordering::Relaxed);
            }
            Status::Denied => {
                self.denials.fetch_add(1, Ordering::Relaxed);
            }
            Status::Failed => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                if envelope.error_kind() == Some(ErrorKind::Timeout) {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub dispatches: u64,
    pub executions: u64,
    pub successes: u64,
    pub denials: u64,
    pub failures: u64,
    pub timeouts: u64,
}

impl MetricsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            return 1.0;
        }
        self.successes as f64 / self.executions as f64
    }
}
