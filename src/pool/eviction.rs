//! Idle eviction timers.
//!
//! One task per idle period. The task waits out the idle timeout unless its
//! token is cancelled first (reacquire or shutdown), then removes and closes
//! the connection only if that same idle period is still parked.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::telemetry::CloseReason;

use super::pool::{close_slot, Shared};
use super::state::ConnectionId;

pub(crate) struct EvictionTask<D: Driver> {
    pub(crate) pool: Weak<Shared<D>>,
    pub(crate) descriptor: String,
    pub(crate) id: ConnectionId,
    pub(crate) generation: u64,
    pub(crate) idle_timeout: Duration,
    pub(crate) cancel: CancellationToken,
}

impl<D: Driver> EvictionTask<D> {
    /// Spawn on the current runtime. Without one the connection stays
    /// parked until it is reacquired or the pool shuts down.
    pub(crate) fn spawn(self) -> Option<JoinHandle<()>> {
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => Some(rt.spawn(self.run())),
            Err(_) => {
                warn!(conn_id = %self.id, "no tokio runtime, idle connection will not be evicted");
                None
            }
        }
    }

    async fn run(self) {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!(conn_id = %self.id, generation = self.generation, "eviction cancelled");
                return;
            }
            () = tokio::time::sleep(self.idle_timeout) => {}
        }

        let Some(shared) = self.pool.upgrade() else {
            return;
        };

        // Membership check and removal happen under one lock acquisition.
        let evicted = {
            let mut state = shared.state.lock();
            let evicted = state.evict(&self.descriptor, self.id, self.generation);
            shared.publish_occupancy(&state);
            evicted
        };

        match evicted {
            Some(entry) => {
                debug!(
                    pool_id = %shared.id,
                    descriptor = %self.descriptor,
                    conn_id = %self.id,
                    "evicting idle connection"
                );
                close_slot(shared.id, &entry.slot, self.id, CloseReason::Evicted).await;
            }
            None => {
                debug!(conn_id = %self.id, generation = self.generation, "eviction skipped, no longer idle");
            }
        }
    }
}
