//! Span utilities for pool operations.

use tracing::{debug_span, Span};

use super::metrics::AcquireOutcome;

/// Extension trait for recording results into spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    /// Record how an acquire was satisfied.
    fn record_outcome(&self, outcome: AcquireOutcome);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_outcome(&self, outcome: AcquireOutcome) {
        self.record("outcome", outcome.as_str());
    }
}

/// Factory for acquire spans.
pub struct AcquireSpan;

impl AcquireSpan {
    /// Fields `outcome`, `conn_id`, `status` and `error.message` are
    /// filled in once the acquire resolves.
    pub fn new(pool_id: &uuid::Uuid, descriptor: &str) -> Span {
        debug_span!(
            "pool_acquire",
            pool_id = %pool_id,
            descriptor = %descriptor,
            outcome = tracing::field::Empty,
            conn_id = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
