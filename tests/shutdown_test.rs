//! Tests for pool shutdown.

use std::time::Duration;

use dsnpool::testing::MemoryDriver;
use dsnpool::{ConnectionState, Pool, PoolError, PoolLifecycle, ShutdownReport};

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_idle_and_used() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone(), 4);

    let idle = pool.acquire("DSN=a", &[]).await.unwrap();
    let used = pool.acquire("DSN=b", &[]).await.unwrap();
    pool.release(idle).await;

    let report = pool.shutdown().await;
    assert_eq!(report, ShutdownReport { closed: 2, failed: 0 });

    let snap = pool.snapshot();
    assert_eq!(snap.lifecycle, PoolLifecycle::Closed);
    assert!(snap.available.is_empty());
    assert!(snap.used.is_empty());
    assert_eq!(used.state().await, ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_twice_is_harmless() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone(), 2);
    let _conn = pool.acquire("DSN=a", &[]).await.unwrap();

    pool.shutdown().await;
    let second = pool.shutdown().await;
    assert_eq!(second, ShutdownReport::default());
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_evictions() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone(), 1);

    let conn = pool.acquire("DSN=a", &["SetConnMaxLifetime=5"]).await.unwrap();
    pool.release(conn).await;
    pool.shutdown().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(driver.close_count(), 1, "timer did not close it again");
}

#[tokio::test(start_paused = true)]
async fn test_connection_held_across_shutdown() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone(), 1);
    let conn = pool.acquire("DSN=a", &[]).await.unwrap();

    assert!(conn.handle().await.is_ok());
    pool.shutdown().await;
    assert!(matches!(conn.handle().await, Err(PoolError::ConnectionClosed)));

    conn.release().await;
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_overflow_outlives_shutdown_until_released() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone(), 0);
    let extra = pool.acquire("DSN=a", &[]).await.unwrap();

    assert_eq!(pool.shutdown().await, ShutdownReport::default());
    assert!(extra.handle().await.is_ok(), "untracked, so not closed by shutdown");

    extra.release().await;
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_after_shutdown() {
    let pool = Pool::new(MemoryDriver::new(), 1);
    pool.shutdown().await;

    let err = pool.acquire("DSN=a", &[]).await.unwrap_err();
    assert!(matches!(err, PoolError::Closed));
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_with_close_failures_finishes() {
    let driver = MemoryDriver::new();
    let pool = Pool::new(driver.clone(), 3);
    let a = pool.acquire("DSN=a", &[]).await.unwrap();
    let b = pool.acquire("DSN=a", &[]).await.unwrap();
    let _c = pool.acquire("DSN=a", &[]).await.unwrap();
    pool.release(a).await;
    pool.release(b).await;

    driver.set_fail_closes(true);
    let report = pool.shutdown().await;
    assert_eq!(report.closed + report.failed, 3);
    assert_eq!(report.failed, 3);
    assert!(pool.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_open_closes_new_handle() {
    let driver = MemoryDriver::new().with_open_delay(Duration::from_millis(100));
    let pool = Pool::new(driver.clone(), 2);

    let (acquired, report) = tokio::join!(pool.acquire("DSN=a", &[]), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown().await
    });

    assert!(matches!(acquired, Err(PoolError::Closed)));
    assert_eq!(report, ShutdownReport::default());
    assert_eq!(driver.open_count(), 1);
    assert_eq!(driver.close_count(), 1);
    assert_eq!(pool.in_use(), 0);
    assert!(pool.snapshot().used.is_empty());
}
