//! Driver capability seam.
//!
//! The pool never talks to a database directly. It only needs to open a raw
//! handle for a descriptor, set its idle timeout, and close it.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DriverError;

/// A raw connection handle owned by exactly one pooled connection.
#[async_trait]
pub trait RawConnection: Send + 'static {
    /// Close the underlying connection. Called at most once per handle.
    async fn close(&mut self) -> Result<(), DriverError>;

    /// Apply the idle timeout resolved at acquire time.
    fn set_idle_timeout(&mut self, timeout: Duration);
}

/// Factory for raw connections, keyed by descriptor.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Handle: RawConnection;

    /// Open a new raw connection for `descriptor`.
    async fn open(&self, descriptor: &str) -> Result<Self::Handle, DriverError>;
}

#[async_trait]
impl<T: Driver> Driver for std::sync::Arc<T> {
    type Handle = T::Handle;

    async fn open(&self, descriptor: &str) -> Result<Self::Handle, DriverError> {
        (**self).open(descriptor).await
    }
}
