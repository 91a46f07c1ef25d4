//! # schedviz-core
//!
//! **Watch the Go scheduler breathe.**
//!
//! `schedviz-core` turns the runtime's `GODEBUG=schedtrace=<ms>` output into a
//! live, bounded view of scheduler state: processors, threads, global and
//! per-P run queues, plus a goroutine count reported on a side channel.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use schedviz_core::{
//!     CollectorConfig, DashboardData, Presenter, ProcessCollector, StateStore, run_pipeline,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! struct Print;
//!
//! impl Presenter for Print {
//!     fn update(&mut self, data: DashboardData) {
//!         println!("grq={} lrq={}", data.current.global_queue, data.current.local_queue_sum);
//!     }
//! }
//!
//! # async fn demo() -> Result<(), schedviz_core::CollectorError> {
//! let mut collector = ProcessCollector::new(CollectorConfig::new("./server", 1000));
//! let store = Arc::new(StateStore::new());
//! let exit = run_pipeline(
//!     &mut collector,
//!     store,
//!     &mut Print,
//!     Duration::from_millis(500),
//!     CancellationToken::new(),
//! )
//! .await?;
//! println!("{} snapshots", exit.received);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Target stderr → [`LineParser`] → bounded channel → [`StateStore`] →
//! [`DashboardData`] → [`Presenter`]
//!
//! - [`collector`]: spawns the target (or reads stdin / a capture file) and
//!   parses lines on a background task.
//! - [`state`]: the latest snapshot plus a fixed-size rolling history.
//! - [`dashboard`]: per-tick frames with log-scaled series and gauge maxima.
//! - [`pipeline`]: the consumer loop tying them together.

pub mod collector;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod snapshot;
pub mod state;

pub use collector::{
    Collector, CollectorState, CollectorStats, ProcessCollector, ReaderCollector,
    MAX_LINE_BYTES, SNAPSHOT_CHANNEL_CAPACITY, SnapshotStream, StatsSnapshot, StopHandle,
};
pub use config::{
    CollectorConfig, DEFAULT_PERIOD_MS, DEFAULT_REFRESH_MS, LaunchPlan, MonitorConfig,
    godebug_value,
};
pub use dashboard::{CurrentValues, DashboardData, GaugeValue, GaugeValues, HistoryPoint, log_scale};
pub use error::CollectorError;
pub use parser::{LineOutcome, LineParser, RejectReason, validate};
pub use pipeline::{ExitReason, PipelineExit, Presenter, run_pipeline};
pub use snapshot::SchedulerSnapshot;
pub use state::{HISTORY_CAPACITY, StateStore};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
