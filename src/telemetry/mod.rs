//! Telemetry for the pool.
//!
//! Structured logging setup, acquire spans, and metrics through the
//! `metrics` facade.

mod logging;
mod metrics;
mod spans;

pub use self::logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_acquire, record_close, record_occupancy, record_open_failure, AcquireOutcome,
    CloseReason,
};
pub use self::spans::{AcquireSpan, SpanExt};
