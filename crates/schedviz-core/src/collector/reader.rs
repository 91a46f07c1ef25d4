//! Collectors over an existing byte stream: attach via stdin, or replay a
//! captured trace file.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    Collector, CollectorState, Lifecycle, SNAPSHOT_CHANNEL_CAPACITY, SnapshotStream,
    StatsSnapshot, StopHandle, read_loop,
};
use crate::error::CollectorError;

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

enum Source {
    Stdin,
    File(PathBuf),
    Reader(Option<BoxedReader>),
}

/// Parses trace lines from a stream that some other process produces.
///
/// Unlike [`super::ProcessCollector`] there is no child to kill: stopping
/// simply abandons the stream.
pub struct ReaderCollector {
    source: Source,
    pace: Option<Duration>,
    lifecycle: Lifecycle,
    task: Option<JoinHandle<()>>,
}

impl ReaderCollector {
    fn with_source(source: Source) -> Self {
        Self {
            source,
            pace: None,
            lifecycle: Lifecycle::new(),
            task: None,
        }
    }

    /// Read trace lines piped into our stdin, e.g.
    /// `GODEBUG=schedtrace=1000 ./app 2>&1 | schedviz attach`.
    pub fn attach_stdin() -> Self {
        Self::with_source(Source::Stdin)
    }

    /// Replay a captured trace file.
    pub fn replay(path: impl Into<PathBuf>) -> Self {
        Self::with_source(Source::File(path.into()))
    }

    /// Read from any async byte stream.
    pub fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Self::with_source(Source::Reader(Some(Box::pin(reader))))
    }

    /// Wait `pace` before delivering each snapshot, so a replay plays back
    /// at roughly the original cadence instead of all at once.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = (!pace.is_zero()).then_some(pace);
        self
    }

    pub async fn join(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("collector task panicked: {e}");
        }
    }

    fn open(&mut self) -> Result<BoxedReader, CollectorError> {
        match &mut self.source {
            Source::Stdin => Ok(Box::pin(tokio::io::stdin())),
            Source::File(path) => {
                let file = std::fs::File::open(&*path).map_err(|source| CollectorError::Replay {
                    path: path.clone(),
                    source,
                })?;
                info!("replaying {}", path.display());
                Ok(Box::pin(tokio::fs::File::from_std(file)))
            }
            Source::Reader(reader) => reader.take().ok_or(CollectorError::AlreadyStarted),
        }
    }
}

impl Collector for ReaderCollector {
    fn start(&mut self, cancel: CancellationToken) -> Result<SnapshotStream, CollectorError> {
        self.lifecycle.begin()?;
        let reader = self.open().map_err(|e| self.lifecycle.fail(e))?;

        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let shutdown = self.lifecycle.shutdown(cancel);
        let lifecycle = self.lifecycle.clone();
        let stats = Arc::clone(self.lifecycle.stats());
        let pace = self.pace;
        self.lifecycle.running();

        self.task = Some(tokio::spawn(async move {
            let exit = read_loop(BufReader::new(reader), tx, shutdown, stats, pace).await;
            debug!("read loop ended: {exit:?}");
            lifecycle.set(CollectorState::Stopped);
        }));

        Ok(rx)
    }

    fn stop(&self) {
        self.lifecycle.stop_handle().stop();
    }

    fn stop_handle(&self) -> StopHandle {
        self.lifecycle.stop_handle()
    }

    fn state(&self) -> CollectorState {
        self.lifecycle.state()
    }

    fn stats(&self) -> StatsSnapshot {
        self.lifecycle.stats().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LINES: &str = "\
SCHED 0ms: gomaxprocs=2 idleprocs=1 threads=3 spinningthreads=0 needspinning=0 idlethreads=1 runqueue=1 [0 2]
SCHED 1000ms: gomaxprocs=2 idleprocs=0 threads=4 spinningthreads=1 needspinning=0 idlethreads=1 runqueue=0 [3 4]
SCHED 2000ms: gomaxprocs=2 idleprocs=2 threads=4 spinningthreads=0 needspinning=0 idlethreads=3 runqueue=0 [0 0]
";

    #[tokio::test]
    async fn replays_a_trace_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LINES.as_bytes()).unwrap();
        file.flush().unwrap();

        let mut collector = ReaderCollector::replay(file.path());
        let mut rx = collector.start(CancellationToken::new()).unwrap();
        let mut times = Vec::new();
        while let Some(s) = rx.recv().await {
            times.push(s.time_ms);
        }
        assert_eq!(times, vec![0, 1000, 2000]);
        collector.join().await;
        assert_eq!(collector.state(), CollectorState::Stopped);
    }

    #[tokio::test]
    async fn missing_replay_file_fails_start() {
        let mut collector = ReaderCollector::replay("/no/such/trace.log");
        let err = collector.start(CancellationToken::new()).unwrap_err();
        assert!(matches!(err, CollectorError::Replay { .. }));
        assert_eq!(collector.state(), CollectorState::Failed);
    }

    #[tokio::test]
    async fn paced_replay_stops_promptly() {
        let mut collector =
            ReaderCollector::from_reader(LINES.as_bytes()).with_pace(Duration::from_secs(30));
        let mut rx = collector.start(CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        collector.stop();

        let end = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("stop interrupts the pacing sleep");
        assert!(end.is_none());
        collector.join().await;
        assert_eq!(collector.stats().snapshots, 0);
    }

    #[test]
    fn zero_pace_means_unpaced() {
        let c = ReaderCollector::from_reader(&b""[..]).with_pace(Duration::ZERO);
        assert!(c.pace.is_none());
    }
}
