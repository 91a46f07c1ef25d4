//! Presentation data built from the rolling window.
//!
//! Renderers never see [`SchedulerSnapshot`] directly; each refresh tick they
//! get one [`DashboardData`] with the current values, the history series in
//! linear and log scale, and gauge current/max pairs ready for percentage
//! display.

use serde::Serialize;

use crate::snapshot::SchedulerSnapshot;

/// Latest values, flattened for tables and bar charts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentValues {
    pub time_ms: u64,
    pub max_procs: u64,
    pub idle_procs: u64,
    pub threads: u64,
    pub spinning_threads: u64,
    pub need_spinning: u64,
    pub idle_threads: u64,
    pub global_queue: u64,
    pub local_queue_sum: u64,
    pub goroutines: u64,
    pub num_p: usize,
    pub local_queues: Vec<u64>,
}

impl From<&SchedulerSnapshot> for CurrentValues {
    fn from(s: &SchedulerSnapshot) -> Self {
        Self {
            time_ms: s.time_ms,
            max_procs: s.max_procs,
            idle_procs: s.idle_procs,
            threads: s.threads,
            spinning_threads: s.spinning_threads,
            need_spinning: s.need_spinning,
            idle_threads: s.idle_threads,
            global_queue: s.global_queue_len,
            local_queue_sum: s.local_queue_sum,
            goroutines: s.secondary_count,
            num_p: s.num_p(),
            local_queues: s.local_queues.clone(),
        }
    }
}

/// One point of every plotted series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistoryPoint<T> {
    pub time_ms: u64,
    pub global_queue: T,
    pub local_queue_sum: T,
    pub idle_procs: T,
    pub threads: T,
    pub goroutines: T,
}

impl From<&SchedulerSnapshot> for HistoryPoint<u64> {
    fn from(s: &SchedulerSnapshot) -> Self {
        Self {
            time_ms: s.time_ms,
            global_queue: s.global_queue_len,
            local_queue_sum: s.local_queue_sum,
            idle_procs: s.idle_procs,
            threads: s.threads,
            goroutines: s.secondary_count,
        }
    }
}

impl HistoryPoint<u64> {
    /// Same point with every series mapped through [`log_scale`].
    pub fn to_log(&self) -> HistoryPoint<f64> {
        HistoryPoint {
            time_ms: self.time_ms,
            global_queue: log_scale(self.global_queue),
            local_queue_sum: log_scale(self.local_queue_sum),
            idle_procs: log_scale(self.idle_procs),
            threads: log_scale(self.threads),
            goroutines: log_scale(self.goroutines),
        }
    }
}

/// `log10(value)`, with zero mapped to zero so empty queues stay on the axis.
pub fn log_scale(value: u64) -> f64 {
    if value == 0 {
        0.0
    } else {
        (value as f64).log10()
    }
}

/// A gauge reading. `max` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GaugeValue {
    pub current: u64,
    pub max: u64,
}

impl Default for GaugeValue {
    fn default() -> Self {
        Self { current: 0, max: 1 }
    }
}

impl GaugeValue {
    /// Gauge whose max is the largest observed value, or 1 if that is 0.
    pub fn new(current: u64, observed_max: u64) -> Self {
        Self {
            current,
            max: observed_max.max(1),
        }
    }

    /// Fill percentage clamped to 0..=100.
    pub fn percent(&self) -> u16 {
        let pct = self.current.saturating_mul(100) / self.max;
        pct.min(100) as u16
    }

    pub fn ratio(&self) -> f64 {
        (self.current as f64 / self.max as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GaugeValues {
    pub global_queue: GaugeValue,
    pub local_queue: GaugeValue,
    pub idle_procs: GaugeValue,
    pub threads: GaugeValue,
    pub goroutines: GaugeValue,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardData {
    pub current: CurrentValues,
    pub history: Vec<HistoryPoint<u64>>,
    pub log_history: Vec<HistoryPoint<f64>>,
    pub gauges: GaugeValues,
}

impl DashboardData {
    /// Build a frame from a `StateStore::snapshot()` pair.
    pub fn from_window(latest: Option<&SchedulerSnapshot>, history: &[SchedulerSnapshot]) -> Self {
        let points: Vec<HistoryPoint<u64>> = history.iter().map(HistoryPoint::from).collect();
        let log_history = points.iter().map(HistoryPoint::to_log).collect();

        let max_of = |f: fn(&HistoryPoint<u64>) -> u64| points.iter().map(f).max().unwrap_or(0);
        let current = latest.map(CurrentValues::from).unwrap_or_default();

        let gauges = GaugeValues {
            global_queue: GaugeValue::new(current.global_queue, max_of(|p| p.global_queue)),
            local_queue: GaugeValue::new(current.local_queue_sum, max_of(|p| p.local_queue_sum)),
            idle_procs: GaugeValue::new(current.idle_procs, max_of(|p| p.idle_procs)),
            threads: GaugeValue::new(current.threads, max_of(|p| p.threads)),
            goroutines: GaugeValue::new(current.goroutines, max_of(|p| p.goroutines)),
        };

        Self {
            current,
            history: points,
            log_history,
            gauges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
