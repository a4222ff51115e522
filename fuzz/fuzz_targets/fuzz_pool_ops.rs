//! Fuzz target for pool bookkeeping.
//!
//! Drives a small pool through an arbitrary sequence of operations and
//! checks the snapshot invariants after each one.

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use dsnpool::testing::MemoryDriver;
use dsnpool::{ExhaustionPolicy, Pool, PoolConfig, PooledConnection};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Acquire { descriptor: u8, lifetime: Option<u8> },
    Release { index: u8 },
    Drop { index: u8 },
    Advance { secs: u8 },
    Shutdown,
}

#[derive(Debug, Arbitrary)]
struct Input {
    max_size: u8,
    fail: bool,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let Ok(rt) = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
    else {
        return;
    };
    rt.block_on(run(input));
});

async fn run(input: Input) {
    let driver = MemoryDriver::new();
    let config = PoolConfig {
        exhaustion: if input.fail { ExhaustionPolicy::Fail } else { ExhaustionPolicy::Overflow },
        ..PoolConfig::with_max_size(usize::from(input.max_size % 8))
    };
    let pool = Pool::with_config(driver.clone(), config);
    let mut held: Vec<PooledConnection<MemoryDriver>> = Vec::new();

    for op in input.ops.into_iter().take(256) {
        match op {
            Op::Acquire { descriptor, lifetime } => {
                let descriptor = format!("DSN={}", descriptor % 4);
                let option = lifetime.map(|s| format!("SetConnMaxLifetime={s}"));
                let options: Vec<&str> = option.iter().map(String::as_str).collect();
                if let Ok(conn) = pool.acquire(&descriptor, &options).await {
                    held.push(conn);
                }
            }
            Op::Release { index } if !held.is_empty() => {
                let conn = held.swap_remove(usize::from(index) % held.len());
                conn.release().await;
            }
            Op::Drop { index } if !held.is_empty() => {
                drop(held.swap_remove(usize::from(index) % held.len()));
                tokio::task::yield_now().await;
            }
            Op::Advance { secs } => tokio::time::sleep(Duration::from_secs(u64::from(secs))).await,
            Op::Shutdown => {
                pool.shutdown().await;
            }
            _ => {}
        }

        let snap = pool.snapshot();
        assert!(snap.is_consistent(), "{snap}");
        assert!(snap.cur_size <= snap.max_size);
    }

    for conn in held {
        conn.release().await;
    }
    pool.shutdown().await;
    tokio::task::yield_now().await;
    assert_eq!(driver.open_count(), driver.close_count());
}
