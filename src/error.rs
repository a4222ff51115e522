//! Error types for the connection pool.
//!
//! Driver failures are wrapped, never retried. Pool exhaustion is only an
//! error under the `Fail` and `Block` exhaustion policies.

use thiserror::Error;

/// Errors reported by a [`Driver`](crate::driver::Driver) or its raw handles.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Open failed: {0}")]
    Open(String),

    #[error("Close failed: {0}")]
    Close(String),

    #[error("Driver error: {0}")]
    Other(String),
}

/// Errors surfaced to pool callers.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to open connection for {descriptor}: {source}")]
    Open {
        descriptor: String,
        #[source]
        source: DriverError,
    },

    #[error("Pool is shut down")]
    Closed,

    #[error("Pool exhausted: {max_size} connections in use")]
    Exhausted { max_size: usize },

    #[error("Acquire timed out after {0}ms")]
    AcquireTimeout(u64),

    #[error("Connection was closed by pool shutdown")]
    ConnectionClosed,
}

impl PoolError {
    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::AcquireTimeout(_))
    }

    /// Returns true if the same acquire may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::AcquireTimeout(_))
    }
}
