//! Scheduler snapshot model.
//!
//! One [`SchedulerSnapshot`] corresponds to one accepted `SCHED` trace line.
//! Snapshots are plain values: once the parser hands one out it is never
//! mutated again, only cloned into the rolling window.

use serde::{Deserialize, Serialize};

/// Scheduler state captured from a single `GODEBUG=schedtrace` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Milliseconds since the monitored process started.
    pub time_ms: u64,
    /// `gomaxprocs`: number of Ps.
    pub max_procs: u64,
    /// Ps with nothing to run.
    pub idle_procs: u64,
    /// OS threads (Ms) created so far.
    pub threads: u64,
    pub spinning_threads: u64,
    pub need_spinning: u64,
    pub idle_threads: u64,
    /// Global run queue length.
    pub global_queue_len: u64,
    /// Per-P local run queue lengths, one entry per P.
    pub local_queues: Vec<u64>,
    /// Sum of `local_queues`, recomputed by the parser.
    pub local_queue_sum: u64,
    /// Goroutine count carried over from the most recent `PROCMETR` line.
    pub secondary_count: u64,
}

impl SchedulerSnapshot {
    /// Number of Ps actually reported in the bracket list.
    pub fn num_p(&self) -> usize {
        self.local_queues.len()
    }

    /// Ps currently running goroutines.
    pub fn busy_procs(&self) -> u64 {
        self.max_procs.saturating_sub(self.idle_procs)
    }

    /// Total runnable goroutines waiting in any queue.
    pub fn total_runnable(&self) -> u64 {
        self.global_queue_len + self.local_queue_sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchedulerSnapshot {
        SchedulerSnapshot {
            time_ms: 5000,
            max_procs: 8,
            idle_procs: 6,
            threads: 12,
            spinning_threads: 1,
            need_spinning: 1,
            idle_threads: 4,
            global_queue_len: 5,
            local_queues: vec![2, 1, 0, 3, 0, 1, 2, 0],
            local_queue_sum: 9,
            secondary_count: 0,
        }
    }

    #[test]
    fn derived_counts() {
        let s = sample();
        assert_eq!(s.num_p(), 8);
        assert_eq!(s.busy_procs(), 2);
        assert_eq!(s.total_runnable(), 14);
    }

    #[test]
    fn busy_procs_never_underflows() {
        let s = SchedulerSnapshot {
            max_procs: 2,
            idle_procs: 5,
            ..Default::default()
        };
        assert_eq!(s.busy_procs(), 0);
    }
}
