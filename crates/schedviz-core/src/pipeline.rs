//! Consumer side: drain a collector into the [`StateStore`] and hand a
//! [`DashboardData`] frame to a [`Presenter`] on every refresh tick.
//!
//! Storing and presenting are decoupled: snapshots are stored as fast as the
//! collector delivers them, while frames are built at the refresh cadence
//! from whatever the store holds at that moment.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::collector::{Collector, CollectorState, StatsSnapshot};
use crate::dashboard::DashboardData;
use crate::error::CollectorError;
use crate::state::StateStore;

/// Something that displays dashboard frames: a terminal UI, a line printer,
/// a test recorder.
pub trait Presenter {
    /// Called once per refresh tick with a fresh frame.
    fn update(&mut self, data: DashboardData);

    /// Collector status, reported just before each [`Presenter::update`].
    fn status(&mut self, _state: CollectorState, _stats: StatsSnapshot) {}

    /// Called once when the pipeline returns.
    fn finish(&mut self, _exit: &PipelineExit) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    /// The collector's stream closed: input ended or the target exited.
    StreamEnded,
    /// The cancellation token fired.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineExit {
    pub reason: ExitReason,
    /// Snapshots stored during the run.
    pub received: u64,
    pub stats: StatsSnapshot,
}

/// Run `collector` until its stream ends or `cancel` fires.
///
/// The collector is always stopped before returning, including when it
/// fails to start. After a stream end one last frame is presented so the
/// final snapshot is never lost between ticks.
pub async fn run_pipeline<C, P>(
    collector: &mut C,
    store: Arc<StateStore>,
    presenter: &mut P,
    refresh: Duration,
    cancel: CancellationToken,
) -> Result<PipelineExit, CollectorError>
where
    C: Collector + ?Sized,
    P: Presenter + ?Sized,
{
    let mut stream = match collector.start(cancel.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            collector.stop();
            return Err(e);
        }
    };

    let mut ticker = tokio::time::interval(refresh.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut received = 0u64;

    let reason = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break ExitReason::Cancelled,
            next = stream.recv() => match next {
                Some(snapshot) => {
                    store.update(snapshot);
                    received += 1;
                }
                None => break ExitReason::StreamEnded,
            },
            _ = ticker.tick() => present(&*collector, &store, presenter),
        }
    };

    collector.stop();
    // Wait for the read loop to let go of the sender.
    while stream.recv().await.is_some() {}

    if reason == ExitReason::StreamEnded {
        present(&*collector, &store, presenter);
    }

    let exit = PipelineExit {
        reason,
        received,
        stats: collector.stats(),
    };
    info!(
        "pipeline finished ({:?}): {} snapshots stored, {} lines read",
        exit.reason, exit.received, exit.stats.lines
    );
    presenter.finish(&exit);
    Ok(exit)
}

fn present<C, P>(collector: &C, store: &StateStore, presenter: &mut P)
where
    C: Collector + ?Sized,
    P: Presenter + ?Sized,
{
    let (latest, history) = store.snapshot();
    let data = DashboardData::from_window(latest.as_ref(), &history);
    debug!("frame: {} history points", data.history.len());
    presenter.status(collector.state(), collector.stats());
    presenter.update(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ReaderCollector;

    const TRACE: &str = "\
SCHED 0ms: gomaxprocs=4 idleprocs=2 threads=6 spinningthreads=0 needspinning=0 idlethreads=2 runqueue=0 [1 0 0 0]
PROCMETR num_goroutines=9
SCHED 1000ms: gomaxprocs=4 idleprocs=1 threads=6 spinningthreads=1 needspinning=0 idlethreads=1 runqueue=3 [2 1 0 0]
SCHED 2000ms: gomaxprocs=4 idleprocs=0 threads=7 spinningthreads=0 needspinning=1 idlethreads=0 runqueue=5 [4 2 1 1]
";

    #[derive(Default)]
    struct Recorder {
        frames: Vec<DashboardData>,
        states: Vec<CollectorState>,
        finished: Vec<PipelineExit>,
    }

    impl Presenter for Recorder {
        fn update(&mut self, data: DashboardData) {
            self.frames.push(data);
        }

        fn status(&mut self, state: CollectorState, _stats: StatsSnapshot) {
            self.states.push(state);
        }

        fn finish(&mut self, exit: &PipelineExit) {
            self.finished.push(*exit);
        }
    }

    #[tokio::test]
    async fn stream_end_presents_final_frame() {
        let mut collector = ReaderCollector::from_reader(TRACE.as_bytes());
        let store = Arc::new(StateStore::new());
        let mut rec = Recorder::default();

        let exit = run_pipeline(
            &mut collector,
            Arc::clone(&store),
            &mut rec,
            Duration::from_millis(10),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(exit.reason, ExitReason::StreamEnded);
        assert_eq!(exit.received, 3);
        assert_eq!(exit.stats.secondary, 1);
        assert_eq!(store.len(), 3);

        let last = rec.frames.last().expect("final frame");
        assert_eq!(last.history.len(), 3);
        assert_eq!(last.current.time_ms, 2000);
        assert_eq!(last.current.goroutines, 9);
        assert_eq!(last.gauges.global_queue.max, 5);
        assert_eq!(rec.states.len(), rec.frames.len());
        assert_eq!(rec.finished, vec![exit]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_collector() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut collector = ReaderCollector::from_reader(reader);
        let handle = collector.stop_handle();
        let mut rec = Recorder::default();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            run_pipeline(
                &mut collector,
                Arc::new(StateStore::new()),
                &mut rec,
                Duration::from_millis(10),
                cancel,
            ),
        )
        .await
        .expect("pipeline honours cancellation")
        .unwrap();

        assert_eq!(exit.reason, ExitReason::Cancelled);
        assert_eq!(exit.received, 0);
        assert!(handle.is_stopped());
        assert!(!rec.frames.is_empty(), "ticks run while waiting for input");
        assert!(rec.frames.iter().all(DashboardData::is_empty));
        assert_eq!(rec.finished.len(), 1);
    }

    #[tokio::test]
    async fn start_failure_is_returned_without_frames() {
        let mut collector = ReaderCollector::replay("/no/such/schedtrace.log");
        let handle = collector.stop_handle();
        let mut rec = Recorder::default();

        let err = run_pipeline(
            &mut collector,
            Arc::new(StateStore::new()),
            &mut rec,
            Duration::from_millis(10),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CollectorError::Replay { .. }));
        assert!(handle.is_stopped());
        assert!(rec.frames.is_empty());
        assert!(rec.finished.is_empty());
    }

    #[tokio::test]
    async fn small_window_keeps_newest() {
        let mut collector = ReaderCollector::from_reader(TRACE.as_bytes());
        let store = Arc::new(StateStore::with_capacity(2));
        let mut rec = Recorder::default();

        run_pipeline(
            &mut collector,
            Arc::clone(&store),
            &mut rec,
            Duration::from_secs(60),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let last = rec.frames.last().unwrap();
        let times: Vec<u64> = last.history.iter().map(|p| p.time_ms).collect();
        assert_eq!(times, vec![1000, 2000]);
    }
}
