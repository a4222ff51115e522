//! Pool metrics through the `metrics` facade.
//!
//! No recorder is installed here. Without one every call is a no-op.

/// How a connection was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Reused,
    Fresh,
    Overflow,
}

impl AcquireOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reused => "reused",
            Self::Fresh => "fresh",
            Self::Overflow => "overflow",
        }
    }
}

/// Why a raw handle was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Evicted,
    Overflow,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evicted => "evicted",
            Self::Overflow => "overflow",
            Self::Shutdown => "shutdown",
        }
    }
}

pub fn record_acquire(outcome: AcquireOutcome) {
    match outcome {
        AcquireOutcome::Reused => {
            metrics::counter!("dsnpool_connections_reused_total").increment(1);
        }
        AcquireOutcome::Fresh | AcquireOutcome::Overflow => {
            metrics::counter!("dsnpool_connections_opened_total", "kind" => outcome.as_str())
                .increment(1);
        }
    }
}

pub fn record_open_failure() {
    metrics::counter!("dsnpool_open_failures_total").increment(1);
}

pub fn record_close(reason: CloseReason, ok: bool) {
    metrics::counter!("dsnpool_connections_closed_total", "reason" => reason.as_str())
        .increment(1);
    if reason == CloseReason::Evicted {
        metrics::counter!("dsnpool_connections_evicted_total").increment(1);
    }
    if !ok {
        metrics::counter!("dsnpool_close_failures_total", "reason" => reason.as_str())
            .increment(1);
    }
}

/// Publish current occupancy.
pub fn record_occupancy(in_use: usize, idle: usize) {
    metrics::gauge!("dsnpool_in_use").set(in_use as f64);
    metrics::gauge!("dsnpool_idle").set(idle as f64);
}
