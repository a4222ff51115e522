//! A connection checked out of the pool.

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::{MappedMutexGuard, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::driver::Driver;
use crate::error::PoolError;
use crate::telemetry::CloseReason;

use super::pool::{close_slot, Shared};
use super::state::{ConnectionId, ConnectionState, Slot};

/// Exclusive access to the raw handle of a pooled connection.
pub type HandleGuard<'a, H> = MappedMutexGuard<'a, H>;

/// A raw connection on loan from a [`Pool`](super::Pool).
///
/// Give it back with [`release`](Self::release). Dropping it releases it as
/// well; any close that implies is spawned on the current tokio runtime.
pub struct PooledConnection<D: Driver> {
    id: ConnectionId,
    descriptor: String,
    idle_timeout: Duration,
    overflow: bool,
    slot: Slot<D::Handle>,
    pool: Weak<Shared<D>>,
    pool_id: Uuid,
    released: bool,
}

impl<D: Driver> PooledConnection<D> {
    pub(crate) fn new(
        id: ConnectionId,
        descriptor: String,
        idle_timeout: Duration,
        overflow: bool,
        slot: Slot<D::Handle>,
        pool: Weak<Shared<D>>,
        pool_id: Uuid,
    ) -> Self {
        Self {
            id,
            descriptor,
            idle_timeout,
            overflow,
            slot,
            pool,
            pool_id,
            released: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Idle timeout resolved when this connection was acquired.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// True if opened beyond capacity. Overflow connections are never
    /// parked; releasing one closes it.
    pub fn is_overflow(&self) -> bool {
        self.overflow
    }

    /// Lock the raw handle for use.
    ///
    /// Fails with [`PoolError::ConnectionClosed`] once the pool has shut
    /// down and closed it.
    pub async fn handle(&self) -> Result<HandleGuard<'_, D::Handle>, PoolError> {
        let guard = self.slot.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| PoolError::ConnectionClosed)
    }

    /// `Used` while the handle is open, `Closed` after pool shutdown.
    pub async fn state(&self) -> ConnectionState {
        if self.slot.lock().await.is_some() {
            ConnectionState::Used
        } else {
            ConnectionState::Closed
        }
    }

    /// Return this connection to the pool.
    ///
    /// A tracked connection is parked as idle and scheduled for eviction
    /// after its idle timeout. An overflow connection, or any connection
    /// released after shutdown, is closed before this returns.
    pub async fn release(mut self) {
        self.released = true;
        if self.check_in() {
            close_slot(self.pool_id, &self.slot, self.id, self.close_reason()).await;
        }
    }

    /// Returns true if the handle must be closed rather than parked.
    fn check_in(&self) -> bool {
        if self.overflow {
            return true;
        }
        match self.pool.upgrade() {
            Some(shared) => shared.check_in(&self.descriptor, self.id, self.idle_timeout),
            None => true,
        }
    }

    fn close_reason(&self) -> CloseReason {
        if self.overflow {
            CloseReason::Overflow
        } else {
            CloseReason::Shutdown
        }
    }
}

impl<D: Driver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if self.released || !self.check_in() {
            return;
        }

        let slot = self.slot.clone();
        let (pool_id, id, reason) = (self.pool_id, self.id, self.close_reason());
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    close_slot(pool_id, &slot, id, reason).await;
                });
            }
            Err(_) => {
                debug!(pool_id = %pool_id, conn_id = %id, "no runtime, dropping handle without close");
                if let Ok(mut guard) = slot.try_lock() {
                    drop(guard.take());
                }
            }
        }
    }
}

impl<D: Driver> fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("idle_timeout", &self.idle_timeout)
            .field("overflow", &self.overflow)
            .finish()
    }
}
