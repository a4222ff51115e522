//! Bookkeeping guarded by the pool mutex.
//!
//! Everything here is synchronous and never awaits. Driver calls happen in
//! `pool.rs` after the guard is dropped.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ExhaustionPolicy;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Logical lifecycle state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Used,
    Available,
    Closed,
}

/// Whether the pool still accepts acquires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolLifecycle {
    Running,
    Closed,
}

/// Shared home of a raw handle. `None` means the handle has been closed.
pub(crate) type Slot<H> = Arc<tokio::sync::Mutex<Option<H>>>;

pub(crate) struct IdleEntry<H> {
    pub id: ConnectionId,
    pub slot: Slot<H>,
    /// Identifies this idle period; stale eviction timers compare against it.
    pub generation: u64,
    /// Timeout this idle period was parked with.
    pub idle_timeout: Duration,
    pub eviction: CancellationToken,
}

pub(crate) struct UsedEntry<H> {
    pub id: ConnectionId,
    pub slot: Slot<H>,
}

/// Outcome of the capacity decision made under the lock.
pub(crate) enum Decision<H> {
    /// Oldest idle entry, already moved into `used`.
    Reuse(IdleEntry<H>),
    /// A capacity slot was reserved; the caller must open a handle.
    Open,
    /// Capacity is exhausted; open an untracked handle.
    Overflow,
    /// Capacity is exhausted and the policy does not overflow.
    Exhausted,
    PoolClosed,
}

/// What a release should do once the lock is dropped.
pub(crate) enum CheckIn {
    /// Parked in `available`; schedule eviction for this idle period.
    Parked {
        generation: u64,
        eviction: CancellationToken,
    },
    /// Not tracked (overflow or pool closed); close the handle directly.
    Close,
}

pub(crate) struct PoolState<H> {
    available: HashMap<String, VecDeque<IdleEntry<H>>>,
    used: HashMap<String, Vec<UsedEntry<H>>>,
    max_size: usize,
    cur_size: usize,
    next_generation: u64,
    lifecycle: PoolLifecycle,
}

impl<H> PoolState<H> {
    pub fn new(max_size: usize) -> Self {
        Self {
            available: HashMap::new(),
            used: HashMap::new(),
            max_size,
            cur_size: 0,
            next_generation: 0,
            lifecycle: PoolLifecycle::Running,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn cur_size(&self) -> usize {
        self.cur_size
    }

    pub fn lifecycle(&self) -> PoolLifecycle {
        self.lifecycle
    }

    pub fn idle_count(&self) -> usize {
        self.available.values().map(VecDeque::len).sum()
    }

    /// Decide how to satisfy an acquire for `descriptor`.
    pub fn decide(&mut self, descriptor: &str, policy: ExhaustionPolicy) -> Decision<H> {
        if self.lifecycle == PoolLifecycle::Closed {
            return Decision::PoolClosed;
        }

        if self.cur_size >= self.max_size {
            return match policy {
                ExhaustionPolicy::Overflow => Decision::Overflow,
                ExhaustionPolicy::Block | ExhaustionPolicy::Fail => Decision::Exhausted,
            };
        }

        self.cur_size += 1;
        match self.pop_idle(descriptor) {
            Some(entry) => {
                entry.eviction.cancel();
                self.used.entry(descriptor.to_string()).or_default().push(UsedEntry {
                    id: entry.id,
                    slot: Arc::clone(&entry.slot),
                });
                Decision::Reuse(entry)
            }
            None => Decision::Open,
        }
    }

    /// Record a freshly opened handle against a slot reserved by `decide`.
    ///
    /// Returns false (and gives the slot back) if the pool closed meanwhile.
    pub fn admit(&mut self, descriptor: &str, id: ConnectionId, slot: Slot<H>) -> bool {
        if self.lifecycle == PoolLifecycle::Closed {
            self.cur_size = self.cur_size.saturating_sub(1);
            return false;
        }
        self.used
            .entry(descriptor.to_string())
            .or_default()
            .push(UsedEntry { id, slot });
        true
    }

    /// Return a slot reserved by `decide` that was never admitted.
    pub fn cancel_reservation(&mut self) {
        self.cur_size = self.cur_size.saturating_sub(1);
    }

    /// Move a released connection from `used` to the back of `available`.
    pub fn check_in(
        &mut self,
        descriptor: &str,
        id: ConnectionId,
        idle_timeout: Duration,
        shutdown: &CancellationToken,
    ) -> CheckIn {
        if self.lifecycle == PoolLifecycle::Closed {
            return CheckIn::Close;
        }
        let Some(entry) = self.remove_used(descriptor, id) else {
            return CheckIn::Close;
        };
        self.cur_size = self.cur_size.saturating_sub(1);

        self.next_generation += 1;
        let generation = self.next_generation;
        let eviction = shutdown.child_token();
        self.available
            .entry(descriptor.to_string())
            .or_default()
            .push_back(IdleEntry {
                id,
                slot: entry.slot,
                generation,
                idle_timeout,
                eviction: eviction.clone(),
            });
        CheckIn::Parked { generation, eviction }
    }

    /// Remove an idle entry if this exact idle period is still parked.
    pub fn evict(&mut self, descriptor: &str, id: ConnectionId, generation: u64) -> Option<IdleEntry<H>> {
        let list = self.available.get_mut(descriptor)?;
        let pos = list
            .iter()
            .position(|e| e.id == id && e.generation == generation)?;
        let entry = list.remove(pos);
        if list.is_empty() {
            self.available.remove(descriptor);
        }
        entry
    }

    /// Mark the pool closed and take every tracked slot, idle first.
    ///
    /// `cur_size` is left as is. Returns `None` if already closed.
    pub fn close(&mut self) -> Option<Vec<(ConnectionId, Slot<H>)>> {
        if self.lifecycle == PoolLifecycle::Closed {
            return None;
        }
        self.lifecycle = PoolLifecycle::Closed;

        let idle = std::mem::take(&mut self.available)
            .into_values()
            .flatten()
            .map(|e| {
                e.eviction.cancel();
                (e.id, e.slot)
            });
        let used = std::mem::take(&mut self.used)
            .into_values()
            .flatten()
            .map(|e| (e.id, e.slot));
        Some(idle.chain(used).collect())
    }

    pub fn state_of(&self, id: ConnectionId) -> Option<ConnectionState> {
        if self.available.values().flatten().any(|e| e.id == id) {
            return Some(ConnectionState::Available);
        }
        if self.used.values().flatten().any(|e| e.id == id) {
            return Some(ConnectionState::Used);
        }
        None
    }

    /// Ids per descriptor, in list order.
    pub fn available_ids(&self) -> impl Iterator<Item = (&str, Vec<ConnectionId>)> {
        self.available
            .iter()
            .map(|(d, list)| (d.as_str(), list.iter().map(|e| e.id).collect()))
    }

    pub fn used_ids(&self) -> impl Iterator<Item = (&str, Vec<ConnectionId>)> {
        self.used
            .iter()
            .map(|(d, list)| (d.as_str(), list.iter().map(|e| e.id).collect()))
    }

    fn pop_idle(&mut self, descriptor: &str) -> Option<IdleEntry<H>> {
        let list = self.available.get_mut(descriptor)?;
        let entry = list.pop_front();
        if list.is_empty() {
            self.available.remove(descriptor);
        }
        entry
    }

    fn remove_used(&mut self, descriptor: &str, id: ConnectionId) -> Option<UsedEntry<H>> {
        let list = self.used.get_mut(descriptor)?;
        let pos = list.iter().position(|e| e.id == id)?;
        let entry = list.remove(pos);
        if list.is_empty() {
            self.used.remove(descriptor);
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(30);

    fn slot() -> Slot<u32> {
        Arc::new(tokio::sync::Mutex::new(Some(7)))
    }

    fn open(state: &mut PoolState<u32>, descriptor: &str) -> ConnectionId {
        assert!(matches!(state.decide(descriptor, ExhaustionPolicy::Overflow), Decision::Open));
        let id = ConnectionId::next();
        assert!(state.admit(descriptor, id, slot()));
        id
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn-"));
    }

    #[test]
    fn test_decide_reserves_capacity() {
        let mut state = PoolState::<u32>::new(2);
        open(&mut state, "D");
        open(&mut state, "D");
        assert_eq!(state.cur_size(), 2);
        assert!(matches!(state.decide("D", ExhaustionPolicy::Overflow), Decision::Overflow));
        assert!(matches!(state.decide("D", ExhaustionPolicy::Fail), Decision::Exhausted));
        assert_eq!(state.cur_size(), 2);
    }

    #[test]
    fn test_check_in_then_reuse_is_fifo() {
        let shutdown = CancellationToken::new();
        let mut state = PoolState::<u32>::new(3);
        let first = open(&mut state, "D");
        let second = open(&mut state, "D");

        assert!(matches!(state.check_in("D", second, IDLE, &shutdown), CheckIn::Parked { .. }));
        assert!(matches!(state.check_in("D", first, IDLE, &shutdown), CheckIn::Parked { .. }));
        assert_eq!(state.cur_size(), 0);
        assert_eq!(state.idle_count(), 2);

        match state.decide("D", ExhaustionPolicy::Overflow) {
            Decision::Reuse(entry) => {
                assert_eq!(entry.id, second, "oldest released is handed out first");
                assert!(entry.eviction.is_cancelled());
                assert_eq!(entry.idle_timeout, IDLE);
            }
            _ => panic!("expected reuse"),
        }
        assert_eq!(state.state_of(second), Some(ConnectionState::Used));
        assert_eq!(state.state_of(first), Some(ConnectionState::Available));
    }

    #[test]
    fn test_check_in_unknown_closes() {
        let shutdown = CancellationToken::new();
        let mut state = PoolState::<u32>::new(1);
        assert!(matches!(
            state.check_in("D", ConnectionId::next(), IDLE, &shutdown),
            CheckIn::Close
        ));
        assert_eq!(state.cur_size(), 0);
    }

    #[test]
    fn test_evict_requires_matching_generation() {
        let shutdown = CancellationToken::new();
        let mut state = PoolState::<u32>::new(1);
        let id = open(&mut state, "D");
        let CheckIn::Parked { generation: first_gen, .. } = state.check_in("D", id, IDLE, &shutdown) else {
            panic!("expected parked");
        };

        assert!(matches!(state.decide("D", ExhaustionPolicy::Overflow), Decision::Reuse(_)));
        let CheckIn::Parked { generation: second_gen, .. } = state.check_in("D", id, IDLE, &shutdown) else {
            panic!("expected parked");
        };

        assert!(state.evict("D", id, first_gen).is_none(), "stale timer is a no-op");
        assert!(state.evict("D", id, second_gen).is_some());
        assert_eq!(state.available_ids().count(), 0, "empty list is pruned");
    }

    #[test]
    fn test_close_takes_everything_once() {
        let shutdown = CancellationToken::new();
        let mut state = PoolState::<u32>::new(4);
        let a = open(&mut state, "A");
        open(&mut state, "B");
        state.check_in("A", a, IDLE, &shutdown);

        let slots = state.close().unwrap();
        assert_eq!(slots.len(), 2);
        assert!(state.close().is_none());
        assert_eq!(state.lifecycle(), PoolLifecycle::Closed);
        assert_eq!(state.cur_size(), 1, "cur_size is not reset");
        assert!(matches!(state.decide("A", ExhaustionPolicy::Overflow), Decision::PoolClosed));
    }

    #[test]
    fn test_admit_after_close_returns_slot() {
        let mut state = PoolState::<u32>::new(2);
        assert!(matches!(state.decide("D", ExhaustionPolicy::Overflow), Decision::Open));
        state.close();
        assert!(!state.admit("D", ConnectionId::next(), slot()));
        assert_eq!(state.cur_size(), 0);
    }
}
