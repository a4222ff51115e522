//! The pool: acquire, release bookkeeping, shutdown.
//!
//! One `parking_lot::Mutex` guards both descriptor maps and the capacity
//! counter. It is never held across an `.await`; driver open and close calls
//! run after the guard is dropped, and the bookkeeping around them is done in
//! separate atomic sections.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::{self, ExhaustionPolicy, PoolConfig};
use crate::driver::{Driver, RawConnection};
use crate::error::PoolError;
use crate::options::AcquireOptions;
use crate::telemetry::{self, AcquireOutcome, AcquireSpan, CloseReason, SpanExt};

use super::connection::PooledConnection;
use super::eviction::EvictionTask;
use super::snapshot::PoolSnapshot;
use super::state::{CheckIn, ConnectionId, ConnectionState, Decision, IdleEntry, PoolState, Slot};

/// Result of [`Pool::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Handles closed successfully.
    pub closed: usize,
    /// Handles whose close failed. They are discarded regardless.
    pub failed: usize,
}

pub(crate) struct Shared<D: Driver> {
    pub(crate) id: Uuid,
    pub(crate) driver: D,
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState<D::Handle>>,
    capacity_freed: Notify,
    shutdown: CancellationToken,
}

impl<D: Driver> Shared<D> {
    pub(crate) fn publish_occupancy(&self, state: &PoolState<D::Handle>) {
        telemetry::record_occupancy(state.cur_size(), state.idle_count());
    }

    /// Bookkeeping half of a release. Returns true if the caller must close
    /// the handle directly instead of parking it.
    pub(crate) fn check_in(
        self: &Arc<Self>,
        descriptor: &str,
        id: ConnectionId,
        idle_timeout: Duration,
    ) -> bool {
        let action = {
            let mut state = self.state.lock();
            let action = state.check_in(descriptor, id, idle_timeout, &self.shutdown);
            self.publish_occupancy(&state);
            action
        };

        match action {
            CheckIn::Parked { generation, eviction } => {
                self.capacity_freed.notify_one();
                debug!(
                    pool_id = %self.id,
                    descriptor,
                    conn_id = %id,
                    idle_timeout_ms = config::millis(idle_timeout),
                    "connection parked"
                );
                EvictionTask {
                    pool: Arc::downgrade(self),
                    descriptor: descriptor.to_string(),
                    id,
                    generation,
                    idle_timeout,
                    cancel: eviction,
                }
                .spawn();
                false
            }
            CheckIn::Close => true,
        }
    }
}

/// Close the handle in `slot`, if it is still open.
///
/// Returns `None` when the slot was already empty, otherwise whether the
/// driver close succeeded. The handle is discarded either way.
pub(crate) async fn close_slot<H: RawConnection>(
    pool_id: Uuid,
    slot: &Slot<H>,
    id: ConnectionId,
    reason: CloseReason,
) -> Option<bool> {
    let handle = slot.lock().await.take();
    let mut handle = handle?;

    let ok = match handle.close().await {
        Ok(()) => {
            debug!(pool_id = %pool_id, conn_id = %id, reason = reason.as_str(), "connection closed");
            true
        }
        Err(e) => {
            warn!(
                pool_id = %pool_id,
                conn_id = %id,
                reason = reason.as_str(),
                error = %e,
                "failed to close connection"
            );
            false
        }
    };
    telemetry::record_close(reason, ok);
    Some(ok)
}

/// Capacity taken by [`PoolState::decide`] that has not reached a caller.
///
/// Dropping it unfulfilled gives the capacity back: an open reservation is
/// returned to the counter, and a reused entry is parked again. This covers
/// a failed open as well as an acquire future dropped mid-await.
struct Reservation<'a, D: Driver> {
    shared: &'a Arc<Shared<D>>,
    descriptor: &'a str,
    pending: Option<Reserved>,
}

enum Reserved {
    Open,
    Reused { id: ConnectionId, idle_timeout: Duration },
}

impl<'a, D: Driver> Reservation<'a, D> {
    fn open(shared: &'a Arc<Shared<D>>, descriptor: &'a str) -> Self {
        Self { shared, descriptor, pending: Some(Reserved::Open) }
    }

    fn reused(
        shared: &'a Arc<Shared<D>>,
        descriptor: &'a str,
        id: ConnectionId,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            shared,
            descriptor,
            pending: Some(Reserved::Reused { id, idle_timeout }),
        }
    }

    fn fulfil(mut self) {
        self.pending = None;
    }
}

impl<D: Driver> Drop for Reservation<'_, D> {
    fn drop(&mut self) {
        let Some(reserved) = self.pending.take() else {
            return;
        };
        let shared = self.shared;
        match reserved {
            Reserved::Open => {
                {
                    let mut state = shared.state.lock();
                    state.cancel_reservation();
                    shared.publish_occupancy(&state);
                }
                shared.capacity_freed.notify_one();
                debug!(pool_id = %shared.id, descriptor = self.descriptor, "reservation returned");
            }
            Reserved::Reused { id, idle_timeout } => {
                // Only shutdown untracks a reserved entry, and it closes
                // the slot itself.
                let _ = shared.check_in(self.descriptor, id, idle_timeout);
                debug!(
                    pool_id = %shared.id,
                    descriptor = self.descriptor,
                    conn_id = %id,
                    "idle connection returned unused"
                );
            }
        }
    }
}

/// Descriptor-keyed connection pool.
///
/// Cloning is cheap; clones share the same state.
pub struct Pool<D: Driver> {
    shared: Arc<Shared<D>>,
}

impl<D: Driver> Clone for Pool<D> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<D: Driver> Pool<D> {
    /// Create a pool of `max_size` tracked connections with default settings.
    pub fn new(driver: D, max_size: usize) -> Self {
        Self::with_config(driver, PoolConfig::with_max_size(max_size))
    }

    pub fn with_config(driver: D, config: PoolConfig) -> Self {
        let id = Uuid::new_v4();
        debug!(
            pool_id = %id,
            max_size = config.max_size,
            exhaustion = %config.exhaustion,
            "pool created"
        );
        Self {
            shared: Arc::new(Shared {
                id,
                driver,
                state: Mutex::new(PoolState::new(config.max_size)),
                config,
                capacity_freed: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn driver(&self) -> &D {
        &self.shared.driver
    }

    pub fn max_size(&self) -> usize {
        self.shared.config.max_size
    }

    /// Connections currently counted against capacity.
    pub fn in_use(&self) -> usize {
        self.shared.state.lock().cur_size()
    }

    /// Idle connections across all descriptors.
    pub fn idle_count(&self) -> usize {
        self.shared.state.lock().idle_count()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().lifecycle() == super::PoolLifecycle::Closed
    }

    /// State of a tracked connection. `None` if the pool does not track it
    /// (closed, evicted, or an overflow connection).
    pub fn state_of(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.shared.state.lock().state_of(id)
    }

    /// Check out a connection for `descriptor`.
    ///
    /// `options` are `Key=Value` strings; see [`crate::options`]. Reuses the
    /// oldest idle connection for the descriptor when capacity allows,
    /// otherwise opens a new one. At capacity the configured
    /// [`ExhaustionPolicy`] applies.
    pub async fn acquire(
        &self,
        descriptor: &str,
        options: &[&str],
    ) -> Result<PooledConnection<D>, PoolError> {
        let span = AcquireSpan::new(&self.shared.id, descriptor);
        let result = self
            .acquire_inner(descriptor, options)
            .instrument(span.clone())
            .await;
        if let Ok(conn) = &result {
            span.record("conn_id", tracing::field::display(conn.id()));
        }
        span.record_result(&result);
        result
    }

    /// Return `conn` to its pool. Same as [`PooledConnection::release`].
    pub async fn release(&self, conn: PooledConnection<D>) {
        conn.release().await;
    }

    /// Close every tracked connection and reject further acquires.
    ///
    /// Checked-out connections are closed too; their holders see
    /// [`PoolError::ConnectionClosed`] on the next access. Calling this
    /// again is a no-op that returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let shared = &self.shared;
        let slots = {
            let mut state = shared.state.lock();
            let slots = state.close();
            shared.publish_occupancy(&state);
            slots
        };
        let Some(slots) = slots else {
            debug!(pool_id = %shared.id, "pool already shut down");
            return ShutdownReport::default();
        };

        shared.shutdown.cancel();
        shared.capacity_freed.notify_waiters();

        let outcomes = join_all(
            slots
                .iter()
                .map(|(id, slot)| close_slot(shared.id, slot, *id, CloseReason::Shutdown)),
        )
        .await;

        let mut report = ShutdownReport::default();
        for outcome in outcomes.into_iter().flatten() {
            if outcome {
                report.closed += 1;
            } else {
                report.failed += 1;
            }
        }
        info!(
            pool_id = %shared.id,
            closed = report.closed,
            failed = report.failed,
            "pool shut down"
        );
        report
    }

    /// Read-only view of the pool's bookkeeping.
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.shared.state.lock();
        PoolSnapshot::capture(self.shared.id, &state)
    }

    /// Log the current snapshot at info level.
    pub fn dump(&self) {
        let snapshot = self.snapshot();
        info!(pool_id = %snapshot.pool_id, "\n{}", snapshot);
    }

    async fn acquire_inner(
        &self,
        descriptor: &str,
        options: &[&str],
    ) -> Result<PooledConnection<D>, PoolError> {
        let shared = &self.shared;
        let (opts, warnings) = AcquireOptions::parse(options, shared.config.idle_timeout);
        for warning in &warnings {
            warn!(pool_id = %shared.id, descriptor, %warning, "ignoring acquire option");
        }
        let idle_timeout = opts.idle_timeout;
        let deadline = shared.config.acquire_timeout.map(|t| Instant::now() + t);

        loop {
            // Registered before the capacity check so a release in between
            // is not missed.
            let notified = shared.capacity_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let decision = {
                let mut state = shared.state.lock();
                let decision = state.decide(descriptor, shared.config.exhaustion);
                shared.publish_occupancy(&state);
                decision
            };

            match decision {
                Decision::Reuse(entry) => return self.reuse(descriptor, entry, idle_timeout).await,
                Decision::Open => return self.open_tracked(descriptor, idle_timeout).await,
                Decision::Overflow => return self.open_overflow(descriptor, idle_timeout).await,
                Decision::PoolClosed => return Err(PoolError::Closed),
                Decision::Exhausted => {
                    if shared.config.exhaustion == ExhaustionPolicy::Fail {
                        return Err(PoolError::Exhausted { max_size: shared.config.max_size });
                    }
                    debug!(pool_id = %shared.id, descriptor, "pool exhausted, waiting for a release");
                    match deadline {
                        Some(deadline) => {
                            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                                let waited = shared.config.acquire_timeout.unwrap_or_default();
                                return Err(PoolError::AcquireTimeout(config::millis(waited)));
                            }
                        }
                        None => notified.await,
                    }
                }
            }
        }
    }

    async fn reuse(
        &self,
        descriptor: &str,
        entry: IdleEntry<D::Handle>,
        idle_timeout: Duration,
    ) -> Result<PooledConnection<D>, PoolError> {
        let reservation = Reservation::reused(&self.shared, descriptor, entry.id, entry.idle_timeout);
        {
            let mut slot = entry.slot.lock().await;
            let Some(handle) = slot.as_mut() else {
                debug!(
                    pool_id = %self.shared.id,
                    descriptor,
                    conn_id = %entry.id,
                    "idle connection closed by shutdown before hand-out"
                );
                return Err(PoolError::Closed);
            };
            handle.set_idle_timeout(idle_timeout);
        }
        reservation.fulfil();

        self.handed_out(descriptor, entry.id, AcquireOutcome::Reused);
        Ok(self.connection(descriptor, entry.id, entry.slot, idle_timeout, false))
    }

    async fn open_tracked(
        &self,
        descriptor: &str,
        idle_timeout: Duration,
    ) -> Result<PooledConnection<D>, PoolError> {
        let shared = &self.shared;
        let reservation = Reservation::open(shared, descriptor);
        let handle = self.open_handle(descriptor, idle_timeout).await?;

        let id = ConnectionId::next();
        let slot: Slot<D::Handle> = Arc::new(tokio::sync::Mutex::new(Some(handle)));
        // `admit` consumes the reservation whether or not it succeeds.
        let admitted = shared.state.lock().admit(descriptor, id, Arc::clone(&slot));
        reservation.fulfil();
        if !admitted {
            close_slot(shared.id, &slot, id, CloseReason::Shutdown).await;
            return Err(PoolError::Closed);
        }

        self.handed_out(descriptor, id, AcquireOutcome::Fresh);
        Ok(self.connection(descriptor, id, slot, idle_timeout, false))
    }

    async fn open_overflow(
        &self,
        descriptor: &str,
        idle_timeout: Duration,
    ) -> Result<PooledConnection<D>, PoolError> {
        let handle = self.open_handle(descriptor, idle_timeout).await?;
        let id = ConnectionId::next();
        let slot = Arc::new(tokio::sync::Mutex::new(Some(handle)));
        self.handed_out(descriptor, id, AcquireOutcome::Overflow);
        Ok(self.connection(descriptor, id, slot, idle_timeout, true))
    }

    async fn open_handle(
        &self,
        descriptor: &str,
        idle_timeout: Duration,
    ) -> Result<D::Handle, PoolError> {
        match self.shared.driver.open(descriptor).await {
            Ok(mut handle) => {
                handle.set_idle_timeout(idle_timeout);
                Ok(handle)
            }
            Err(source) => {
                telemetry::record_open_failure();
                warn!(pool_id = %self.shared.id, descriptor, error = %source, "driver open failed");
                Err(PoolError::Open {
                    descriptor: descriptor.to_string(),
                    source,
                })
            }
        }
    }

    fn handed_out(&self, descriptor: &str, id: ConnectionId, outcome: AcquireOutcome) {
        telemetry::record_acquire(outcome);
        Span::current().record_outcome(outcome);
        debug!(
            pool_id = %self.shared.id,
            descriptor,
            conn_id = %id,
            outcome = outcome.as_str(),
            "connection acquired"
        );
    }

    fn connection(
        &self,
        descriptor: &str,
        id: ConnectionId,
        slot: Slot<D::Handle>,
        idle_timeout: Duration,
        overflow: bool,
    ) -> PooledConnection<D> {
        PooledConnection::new(
            id,
            descriptor.to_string(),
            idle_timeout,
            overflow,
            slot,
            Arc::downgrade(&self.shared),
            self.shared.id,
        )
    }
}

impl<D: Driver> fmt::Display for Pool<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.snapshot(), f)
    }
}

impl<D: Driver> fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Pool")
            .field("id", &self.shared.id)
            .field("max_size", &state.max_size())
            .field("cur_size", &state.cur_size())
            .field("idle", &state.idle_count())
            .field("lifecycle", &state.lifecycle())
            .finish()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
