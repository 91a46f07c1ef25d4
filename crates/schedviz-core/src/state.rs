//! Lock-guarded rolling window of recent snapshots.
//!
//! The consumer task writes through [`StateStore::update`] while the refresh
//! timer reads through [`StateStore::snapshot`]. Readers always get owned
//! copies, so chart code can iterate the history as often as it likes
//! without holding the lock.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use crate::snapshot::SchedulerSnapshot;

/// Number of snapshots kept by default.
pub const HISTORY_CAPACITY: usize = 60;

#[derive(Debug)]
struct RollingWindow {
    latest: Option<SchedulerSnapshot>,
    history: VecDeque<SchedulerSnapshot>,
    capacity: usize,
}

/// Thread-safe latest value plus a fixed-capacity FIFO history.
#[derive(Debug)]
pub struct StateStore {
    window: RwLock<RollingWindow>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Empty store with [`HISTORY_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Empty store holding at most `capacity` snapshots (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: RwLock::new(RollingWindow {
                latest: None,
                history: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.window
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity
    }

    /// Record a new snapshot, evicting the oldest one when full.
    pub fn update(&self, snapshot: SchedulerSnapshot) {
        let mut w = self.window.write().unwrap_or_else(PoisonError::into_inner);
        if w.history.len() == w.capacity {
            w.history.pop_front();
        }
        w.history.push_back(snapshot.clone());
        w.latest = Some(snapshot);
    }

    /// Latest snapshot and an independent copy of the history, oldest first.
    pub fn snapshot(&self) -> (Option<SchedulerSnapshot>, Vec<SchedulerSnapshot>) {
        let w = self.window.read().unwrap_or_else(PoisonError::into_inner);
        (w.latest.clone(), w.history.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.window
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
