//! In-memory driver for tests, benches and the demo command.
//!
//! `MemoryDriver` opens fake handles and records every driver call so tests
//! can check what the pool did without a database.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{Driver, RawConnection};
use crate::error::DriverError;

/// Record of a driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Open { descriptor: String, handle: u64 },
    SetIdleTimeout { handle: u64, timeout: Duration },
    Close { descriptor: String, handle: u64, ok: bool },
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<DriverCall>>,
    next_handle: AtomicU64,
    fail_opens: AtomicBool,
    fail_closes: AtomicBool,
    open_delay: Mutex<Option<Duration>>,
}

/// Driver whose handles live in memory. Clones share the same call log.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `open`. Pairs with paused tokio time.
    pub fn with_open_delay(self, delay: Duration) -> Self {
        *self.shared.open_delay.lock() = Some(delay);
        self
    }

    /// Make subsequent opens fail.
    pub fn set_fail_opens(&self, fail: bool) {
        self.shared.fail_opens.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent closes fail. The handle is still discarded.
    pub fn set_fail_closes(&self, fail: bool) {
        self.shared.fail_closes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.shared.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }

    pub fn open_count(&self) -> usize {
        self.count(|c| matches!(c, DriverCall::Open { .. }))
    }

    pub fn open_count_for(&self, descriptor: &str) -> usize {
        self.count(|c| matches!(c, DriverCall::Open { descriptor: d, .. } if d == descriptor))
    }

    /// Close attempts, successful or not.
    pub fn close_count(&self) -> usize {
        self.count(|c| matches!(c, DriverCall::Close { .. }))
    }

    pub fn failed_close_count(&self) -> usize {
        self.count(|c| matches!(c, DriverCall::Close { ok: false, .. }))
    }

    /// Handles that have seen a close attempt, in call order.
    pub fn closed_handles(&self) -> Vec<u64> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Close { handle, .. } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    /// Last idle timeout applied to `handle`.
    pub fn idle_timeout_of(&self, handle: u64) -> Option<Duration> {
        self.shared.calls.lock().iter().rev().find_map(|c| match c {
            DriverCall::SetIdleTimeout { handle: h, timeout } if *h == handle => Some(*timeout),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&DriverCall) -> bool) -> usize {
        self.shared.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: DriverCall) {
        self.shared.calls.lock().push(call);
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Handle = MemoryConnection;

    async fn open(&self, descriptor: &str) -> Result<MemoryConnection, DriverError> {
        let delay = *self.shared.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.shared.fail_opens.load(Ordering::SeqCst) {
            return Err(DriverError::Open(format!("refused: {descriptor}")));
        }

        let handle = self.shared.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(DriverCall::Open {
            descriptor: descriptor.to_string(),
            handle,
        });
        Ok(MemoryConnection {
            handle,
            descriptor: descriptor.to_string(),
            idle_timeout: None,
            driver: self.clone(),
        })
    }
}

/// Fake raw handle produced by [`MemoryDriver`].
pub struct MemoryConnection {
    handle: u64,
    descriptor: String,
    idle_timeout: Option<Duration>,
    driver: MemoryDriver,
}

impl MemoryConnection {
    /// Driver-assigned handle number, unique per driver.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Pretend to run a statement.
    pub fn execute(&self, statement: &str) -> String {
        format!("{}#{}: {}", self.descriptor, self.handle, statement)
    }
}

#[async_trait]
impl RawConnection for MemoryConnection {
    async fn close(&mut self) -> Result<(), DriverError> {
        let ok = !self.driver.shared.fail_closes.load(Ordering::SeqCst);
        self.driver.record(DriverCall::Close {
            descriptor: self.descriptor.clone(),
            handle: self.handle,
            ok,
        });
        if ok {
            Ok(())
        } else {
            Err(DriverError::Close(format!("handle {} refused to close", self.handle)))
        }
    }

    fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout = Some(timeout);
        self.driver.record(DriverCall::SetIdleTimeout {
            handle: self.handle,
            timeout,
        });
    }
}
