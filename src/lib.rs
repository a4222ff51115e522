//! dsnpool
//!
//! A connection pool that sits in front of a database driver. It bounds the
//! number of live connections, reuses idle connections per descriptor, and
//! closes connections that stay idle past their timeout.
//!
//! # Model
//!
//! - **Descriptor**: opaque string naming a connection target (a DSN).
//!   Connections are only reused for the exact descriptor they were opened with.
//! - **Capacity**: at most `max_size` connections are tracked at once.
//!   Beyond that the [`ExhaustionPolicy`] decides: overflow, block, or fail.
//! - **Eviction**: every release schedules a timer for that idle period.
//!   Reacquiring the connection or shutting the pool down cancels it.
//!
//! # Example
//!
//! ```no_run
//! use dsnpool::testing::MemoryDriver;
//! use dsnpool::Pool;
//!
//! # async fn run() -> Result<(), dsnpool::PoolError> {
//! let pool = Pool::new(MemoryDriver::new(), 4);
//! let conn = pool.acquire("DSN=orders", &["SetConnMaxLifetime=60"]).await?;
//! conn.release().await;
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod options;
pub mod pool;
pub mod telemetry;
pub mod testing;

pub use config::{ExhaustionPolicy, PoolConfig};
pub use driver::{Driver, RawConnection};
pub use error::{DriverError, PoolError};
pub use options::{AcquireOptions, OptionWarning};
pub use pool::{
    ConnectionId, ConnectionState, HandleGuard, Pool, PoolLifecycle, PoolSnapshot,
    PooledConnection, ShutdownReport,
};
