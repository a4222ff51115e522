//! Descriptor-keyed connection pool.
//!
//! Connections are keyed by the exact descriptor string they were opened
//! with. Up to `max_size` connections are tracked across all descriptors.
//! A released connection is parked as idle and reused FIFO for the same
//! descriptor; if it stays idle past its timeout it is closed.
//!
//! Acquires beyond capacity follow [`ExhaustionPolicy`](crate::ExhaustionPolicy):
//! open an untracked overflow connection, wait for a release, or fail.

mod connection;
mod eviction;
#[allow(clippy::module_inception)]
mod pool;
mod snapshot;
mod state;

pub use connection::{HandleGuard, PooledConnection};
pub use pool::{Pool, ShutdownReport};
pub use snapshot::PoolSnapshot;
pub use state::{ConnectionId, ConnectionState, PoolLifecycle};
