//! Read-only view of pool bookkeeping for diagnostics.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{ConnectionId, PoolLifecycle, PoolState};

/// Point-in-time copy of a pool's maps and counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub pool_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub lifecycle: PoolLifecycle,
    pub max_size: usize,
    pub cur_size: usize,
    /// Idle connections per descriptor, oldest released first.
    pub available: BTreeMap<String, Vec<ConnectionId>>,
    pub used: BTreeMap<String, Vec<ConnectionId>>,
}

impl PoolSnapshot {
    pub(crate) fn capture<H>(pool_id: Uuid, state: &PoolState<H>) -> Self {
        Self {
            pool_id,
            taken_at: Utc::now(),
            lifecycle: state.lifecycle(),
            max_size: state.max_size(),
            cur_size: state.cur_size(),
            available: state
                .available_ids()
                .map(|(d, ids)| (d.to_string(), ids))
                .collect(),
            used: state
                .used_ids()
                .map(|(d, ids)| (d.to_string(), ids))
                .collect(),
        }
    }

    /// Idle ids for `descriptor`, empty if none.
    pub fn available_for(&self, descriptor: &str) -> &[ConnectionId] {
        self.available.get(descriptor).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn used_for(&self, descriptor: &str) -> &[ConnectionId] {
        self.used.get(descriptor).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn idle_count(&self) -> usize {
        self.available.values().map(Vec::len).sum()
    }

    pub fn used_count(&self) -> usize {
        self.used.values().map(Vec::len).sum()
    }

    /// Structural invariants: no empty lists, no id listed twice, and no id
    /// both idle and in use.
    pub fn is_consistent(&self) -> bool {
        let mut seen = HashSet::new();
        self.available
            .values()
            .chain(self.used.values())
            .all(|ids| !ids.is_empty() && ids.iter().all(|id| seen.insert(*id)))
    }
}

fn write_map(f: &mut fmt::Formatter<'_>, map: &BTreeMap<String, Vec<ConnectionId>>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (descriptor, ids)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{descriptor}: [")?;
        for (j, id) in ids.iter().enumerate() {
            if j > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("]")?;
    }
    f.write_str("}")
}

impl fmt::Display for PoolSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("available: ")?;
        write_map(f, &self.available)?;
        f.write_str("\nused: ")?;
        write_map(f, &self.used)?;
        write!(f, "\nmax_size: {}\ncur_size: {}", self.max_size, self.cur_size)
    }
}
