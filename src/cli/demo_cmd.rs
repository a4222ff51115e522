// Copyright 2024-2026 dsnpool Contributors
// SPDX-License-Identifier: Apache-2.0

//! `dsnpool demo`: walk a two-slot pool through fresh opens, reuse,
//! overflow and eviction against the in-memory driver, printing a snapshot
//! after every step.

use std::time::Duration;

use serde::Serialize;

use crate::error::PoolError;
use crate::pool::{Pool, PoolSnapshot, ShutdownReport};
use crate::testing::MemoryDriver;

use super::{EXIT_FAILURE, EXIT_OK};

const DESCRIPTOR: &str = "DSN=demo";
const IDLE_SECS: u64 = 1;

/// One labelled snapshot from the demo run.
#[derive(Debug, Clone, Serialize)]
pub struct DemoStep {
    pub label: String,
    pub snapshot: PoolSnapshot,
}

#[derive(Debug, Serialize)]
struct DemoOutput {
    steps: Vec<DemoStep>,
    opened: usize,
    closed: usize,
    shutdown: ShutdownReport,
}

fn step(steps: &mut Vec<DemoStep>, pool: &Pool<MemoryDriver>, label: &str) {
    steps.push(DemoStep {
        label: label.to_string(),
        snapshot: pool.snapshot(),
    });
}

async fn scenario(driver: MemoryDriver) -> Result<DemoOutput, PoolError> {
    let pool = Pool::new(driver.clone(), 2);
    let lifetime = format!("SetConnMaxLifetime={IDLE_SECS}");
    let options = [lifetime.as_str()];
    let mut steps = Vec::new();

    let c1 = pool.acquire(DESCRIPTOR, &options).await?;
    let c2 = pool.acquire(DESCRIPTOR, &options).await?;
    step(&mut steps, &pool, "acquired two fresh connections");

    pool.release(c1).await;
    step(&mut steps, &pool, "released the first");

    let reused = pool.acquire(DESCRIPTOR, &options).await?;
    step(&mut steps, &pool, "reacquired the idle connection");

    let extra = pool.acquire(DESCRIPTOR, &options).await?;
    step(&mut steps, &pool, "acquired an overflow connection");
    pool.release(extra).await;
    step(&mut steps, &pool, "released the overflow connection");

    pool.release(reused).await;
    pool.release(c2).await;
    step(&mut steps, &pool, "released both tracked connections");

    tokio::time::sleep(Duration::from_millis(IDLE_SECS * 1000 + 200)).await;
    step(&mut steps, &pool, "after the idle timeout");

    let shutdown = pool.shutdown().await;
    step(&mut steps, &pool, "after shutdown");

    Ok(DemoOutput {
        steps,
        opened: driver.open_count(),
        closed: driver.close_count(),
        shutdown,
    })
}

/// Run the demo. Returns the process exit code.
pub async fn run_demo(json: bool) -> i32 {
    let output = match scenario(MemoryDriver::new()).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Demo failed: {}", e);
            return EXIT_FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode demo output: {}", e);
                return EXIT_FAILURE;
            }
        }
    } else {
        for (i, step) in output.steps.iter().enumerate() {
            println!("[{}] {}", i + 1, step.label);
            println!("{}\n", step.snapshot);
        }
        println!(
            "opened: {}  closed: {}  shutdown closed: {}  shutdown failed: {}",
            output.opened, output.closed, output.shutdown.closed, output.shutdown.failed
        );
    }
    EXIT_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scenario_steps() {
        let out = scenario(MemoryDriver::new()).await.unwrap();

        assert_eq!(out.steps.len(), 8);
        assert!(out.steps.iter().all(|s| s.snapshot.is_consistent()));
        assert_eq!(out.steps[2].snapshot.cur_size, 2);
        assert_eq!(out.steps[3].snapshot.cur_size, 2, "overflow leaves cur_size alone");
        assert_eq!(out.steps[5].snapshot.idle_count(), 2);
        assert_eq!(out.steps[6].snapshot.idle_count(), 0);
        assert_eq!(out.opened, 3);
        assert_eq!(out.closed, 3);
        assert_eq!(out.shutdown, ShutdownReport::default());
    }
}
