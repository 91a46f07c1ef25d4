//! Snapshot collectors.
//!
//! ```text
//!   ┌──────────────────┐
//!   │  target process  │  GODEBUG=schedtrace=<period>
//!   └────────┬─────────┘
//!            │ stderr
//!   ┌────────▼─────────┐      bounded channel      ┌──────────────┐
//!   │    read loop     │ ─────────────────────────▶│   consumer   │
//!   │  + LineParser    │   (blocks when full)      └──────────────┘
//!   └──────────────────┘
//! ```
//!
//! Every collector runs the same [`read_loop`] over some byte stream: a
//! spawned process's stderr ([`ProcessCollector`]), our own stdin or a
//! captured trace file ([`ReaderCollector`]). Both the line read and the
//! channel send race against shutdown, so a stalled consumer or a silent
//! target never holds up teardown.

mod process;
mod reader;

pub use process::ProcessCollector;
pub use reader::ReaderCollector;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, trace, warn};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CollectorError;
use crate::parser::{LineOutcome, LineParser};
use crate::snapshot::SchedulerSnapshot;

/// Snapshots buffered between producer and consumer. Kept at one so a slow
/// consumer throttles delivery instead of growing memory.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 1;

/// Longest line the read loop will buffer. Anything longer is dropped and
/// counted as rejected.
pub const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Receiving half handed out by [`Collector::start`].
pub type SnapshotStream = mpsc::Receiver<SchedulerSnapshot>;

// ---------------------------------------------------------------------------
// Collector trait
// ---------------------------------------------------------------------------

/// A source of scheduler snapshots.
pub trait Collector: Send {
    /// Begin collecting. The stream ends when the input ends, when `cancel`
    /// fires, or after [`Collector::stop`].
    fn start(&mut self, cancel: CancellationToken) -> Result<SnapshotStream, CollectorError>;

    /// Request shutdown. Idempotent.
    fn stop(&self);

    /// Handle that can stop this collector from another thread.
    fn stop_handle(&self) -> StopHandle;

    fn state(&self) -> CollectorState;

    fn stats(&self) -> StatsSnapshot;
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// `Idle → Starting → Running → Stopping → Stopped`, or `Starting → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CollectorState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
    Failed = 5,
}

impl CollectorState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl std::fmt::Display for CollectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Cloneable stop trigger, usable from any thread at any time.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
    state: Arc<AtomicU8>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
        let _ = self.state.compare_exchange(
            CollectorState::Running as u8,
            CollectorState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let _ = self.state.compare_exchange(
            CollectorState::Idle as u8,
            CollectorState::Stopped as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// State, stop token and counters shared between a collector and its task.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    state: Arc<AtomicU8>,
    stop: CancellationToken,
    stats: Arc<CollectorStats>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CollectorState::Idle as u8)),
            stop: CancellationToken::new(),
            stats: Arc::new(CollectorStats::default()),
        }
    }

    pub(crate) fn state(&self) -> CollectorState {
        CollectorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: CollectorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// `Idle → Starting`, refusing a second start or a start after stop.
    pub(crate) fn begin(&self) -> Result<(), CollectorError> {
        if self.stop.is_cancelled() {
            return Err(CollectorError::Stopped);
        }
        self.state
            .compare_exchange(
                CollectorState::Idle as u8,
                CollectorState::Starting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(drop)
            .map_err(|_| CollectorError::AlreadyStarted)
    }

    /// Record a startup failure and hand the error back.
    pub(crate) fn fail(&self, err: CollectorError) -> CollectorError {
        warn!("collector failed to start: {err}");
        self.set(CollectorState::Failed);
        err
    }

    /// `Starting → Running`, unless a stop raced in while starting.
    pub(crate) fn running(&self) {
        let _ = self.state.compare_exchange(
            CollectorState::Starting as u8,
            CollectorState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if self.stop.is_cancelled() {
            self.set(CollectorState::Stopping);
        }
    }

    pub(crate) fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn shutdown(&self, external: CancellationToken) -> Shutdown {
        Shutdown {
            external,
            stop: self.stop.clone(),
        }
    }

    pub(crate) fn stats(&self) -> &Arc<CollectorStats> {
        &self.stats
    }
}

/// Either the caller's cancellation token or our own stop request.
#[derive(Debug, Clone)]
pub(crate) struct Shutdown {
    external: CancellationToken,
    stop: CancellationToken,
}

impl Shutdown {
    pub(crate) async fn requested(&self) {
        tokio::select! {
            _ = self.external.cancelled() => {}
            _ = self.stop.cancelled() => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Running line counters, updated by the read loop.
#[derive(Debug, Default)]
pub struct CollectorStats {
    lines: AtomicU64,
    snapshots: AtomicU64,
    rejected: AtomicU64,
    secondary: AtomicU64,
}

/// Point-in-time copy of [`CollectorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub lines: u64,
    pub snapshots: u64,
    pub rejected: u64,
    pub secondary: u64,
}

impl CollectorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            secondary: self.secondary.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

/// Why a read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    EndOfStream,
    Shutdown,
    ConsumerGone,
    ReadError,
}

/// Scan `reader` line by line, forwarding accepted snapshots to `tx`.
///
/// Dropping `tx` on return is what closes the consumer's stream, so every
/// exit path closes it exactly once.
pub(crate) async fn read_loop<R>(
    mut reader: R,
    tx: mpsc::Sender<SchedulerSnapshot>,
    shutdown: Shutdown,
    stats: Arc<CollectorStats>,
    pace: Option<Duration>,
) -> LoopExit
where
    R: AsyncBufRead + Unpin,
{
    let mut parser = LineParser::new();
    let mut buf = Vec::with_capacity(256);
    // Set while skipping the rest of an over-long line.
    let mut oversized = false;

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES);
        let read = tokio::select! {
            _ = shutdown.requested() => return LoopExit::Shutdown,
            r = limited.read_until(b'\n', &mut buf) => r,
        };
        match read {
            Ok(0) => return LoopExit::EndOfStream,
            Ok(_) => {}
            Err(e) => {
                warn!("trace stream read failed: {e}");
                return LoopExit::ReadError;
            }
        }

        let complete = buf.last() == Some(&b'\n');
        if oversized {
            oversized = !complete;
            continue;
        }
        stats.lines.fetch_add(1, Ordering::Relaxed);
        if !complete && buf.len() as u64 == MAX_LINE_BYTES {
            stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("dropped a line longer than {MAX_LINE_BYTES} bytes");
            oversized = true;
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        let snapshot = match parser.parse_line(&line) {
            LineOutcome::Snapshot(s) => s,
            LineOutcome::Secondary(v) => {
                stats.secondary.fetch_add(1, Ordering::Relaxed);
                trace!("goroutines = {v}");
                continue;
            }
            LineOutcome::Rejected(reason) => {
                stats.rejected.fetch_add(1, Ordering::Relaxed);
                trace!("dropped line ({reason}): {}", line.trim_end());
                continue;
            }
        };

        if let Some(pace) = pace {
            tokio::select! {
                _ = shutdown.requested() => return LoopExit::Shutdown,
                _ = tokio::time::sleep(pace) => {}
            }
        }

        tokio::select! {
            _ = shutdown.requested() => return LoopExit::Shutdown,
            sent = tx.send(snapshot) => {
                if sent.is_err() {
                    debug!("snapshot consumer went away");
                    return LoopExit::ConsumerGone;
                }
            }
        }
        stats.snapshots.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    const BUSY: &str = "SCHED 5000ms: gomaxprocs=8 idleprocs=6 threads=12 spinningthreads=1 needspinning=1 idlethreads=4 runqueue=5 [2 1 0 3 0 1 2 0]\n";

    fn shutdown() -> (Shutdown, CancellationToken, CancellationToken) {
        let external = CancellationToken::new();
        let stop = CancellationToken::new();
        let s = Shutdown {
            external: external.clone(),
            stop: stop.clone(),
        };
        (s, external, stop)
    }

    #[tokio::test]
    async fn forwards_snapshots_and_counts_lines() {
        let input = format!("garbage\n{BUSY}PROCMETR num_goroutines=11\n{BUSY}");
        let (tx, mut rx) = mpsc::channel(8);
        let stats = Arc::new(CollectorStats::default());
        let (s, _ext, _stop) = shutdown();

        let exit = read_loop(
            BufReader::new(input.as_bytes()),
            tx,
            s,
            Arc::clone(&stats),
            None,
        )
        .await;

        assert_eq!(exit, LoopExit::EndOfStream);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.secondary_count, 0);
        assert_eq!(second.secondary_count, 11);
        assert!(rx.recv().await.is_none());
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                lines: 4,
                snapshots: 2,
                rejected: 1,
                secondary: 1,
            }
        );
    }

    #[tokio::test]
    async fn last_line_without_newline_is_parsed() {
        let input = BUSY.trim_end().to_string();
        let (tx, mut rx) = mpsc::channel(1);
        let (s, _ext, _stop) = shutdown();
        let stats = Arc::new(CollectorStats::default());
        read_loop(BufReader::new(input.as_bytes()), tx, s, stats, None).await;
        assert_eq!(rx.recv().await.unwrap().local_queue_sum, 9);
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_loop() {
        let mut input = vec![0xff, 0xfe, b'\n'];
        input.extend_from_slice(BUSY.as_bytes());
        let (tx, mut rx) = mpsc::channel(1);
        let (s, _ext, _stop) = shutdown();
        let stats = Arc::new(CollectorStats::default());
        let exit = read_loop(BufReader::new(&input[..]), tx, s, stats, None).await;
        assert_eq!(exit, LoopExit::EndOfStream);
        assert!(rx.recv().await.is_some());
    }

    /// Yields `data`, then fails every later read.
    struct FailAfter(&'static [u8]);

    impl tokio::io::AsyncRead for FailAfter {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.0.is_empty() {
                return std::task::Poll::Ready(Err(std::io::Error::other("device gone")));
            }
            let n = self.0.len().min(buf.remaining());
            buf.put_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn read_error_ends_loop_and_closes_stream() {
        let (tx, mut rx) = mpsc::channel(4);
        let (s, _ext, _stop) = shutdown();
        let stats = Arc::new(CollectorStats::default());

        let exit = read_loop(
            BufReader::new(FailAfter(BUSY.as_bytes())),
            tx,
            s,
            Arc::clone(&stats),
            None,
        )
        .await;

        assert_eq!(exit, LoopExit::ReadError);
        assert_eq!(rx.recv().await.unwrap().time_ms, 5000);
        assert!(rx.recv().await.is_none());
        assert_eq!(stats.snapshot().snapshots, 1);
    }

    #[tokio::test]
    async fn over_long_line_is_dropped_and_counted() {
        let mut input = "x".repeat(MAX_LINE_BYTES as usize + 10_000);
        input.push('\n');
        input.push_str(BUSY);
        let (tx, mut rx) = mpsc::channel(4);
        let (s, _ext, _stop) = shutdown();
        let stats = Arc::new(CollectorStats::default());

        let exit = read_loop(
            BufReader::new(input.as_bytes()),
            tx,
            s,
            Arc::clone(&stats),
            None,
        )
        .await;

        assert_eq!(exit, LoopExit::EndOfStream);
        assert_eq!(rx.recv().await.unwrap().local_queue_sum, 9);
        assert!(rx.recv().await.is_none());
        let stats = stats.snapshot();
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.snapshots, 1);
    }

    #[tokio::test]
    async fn blocked_send_yields_to_cancellation() {
        let input = BUSY.repeat(3);
        let (tx, rx) = mpsc::channel(1);
        let (s, external, _stop) = shutdown();
        let stats = Arc::new(CollectorStats::default());

        let task = tokio::spawn(async move {
            read_loop(BufReader::new(input.as_bytes()), tx, s, stats, None).await
        });
        // Nobody receives: the second send blocks until cancellation.
        tokio::time::sleep(Duration::from_millis(50)).await;
        external.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop exits promptly")
            .unwrap();
        assert_eq!(exit, LoopExit::Shutdown);
        drop(rx);
    }

    #[tokio::test]
    async fn pending_read_yields_to_stop() {
        let (_writer, reader) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::channel(1);
        let (s, _ext, stop) = shutdown();
        let stats = Arc::new(CollectorStats::default());

        let task = tokio::spawn(async move {
            read_loop(BufReader::new(reader), tx, s, stats, None).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop exits promptly")
            .unwrap();
        assert_eq!(exit, LoopExit::Shutdown);
    }

    #[tokio::test]
    async fn dropped_consumer_ends_loop() {
        let input = BUSY.repeat(2);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (s, _ext, _stop) = shutdown();
        let stats = Arc::new(CollectorStats::default());
        let exit = read_loop(BufReader::new(input.as_bytes()), tx, s, stats, None).await;
        assert_eq!(exit, LoopExit::ConsumerGone);
    }

    #[test]
    fn stop_handle_transitions() {
        let lc = Lifecycle::new();
        let handle = lc.stop_handle();
        assert_eq!(lc.state(), CollectorState::Idle);
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert_eq!(lc.state(), CollectorState::Stopped);
        assert!(matches!(lc.begin(), Err(CollectorError::Stopped)));
    }

    #[test]
    fn begin_twice_is_refused() {
        let lc = Lifecycle::new();
        lc.begin().unwrap();
        assert_eq!(lc.state(), CollectorState::Starting);
        assert!(matches!(lc.begin(), Err(CollectorError::AlreadyStarted)));
        lc.running();
        assert_eq!(lc.state(), CollectorState::Running);
        lc.stop_handle().stop();
        assert_eq!(lc.state(), CollectorState::Stopping);
    }

    #[test]
    fn state_display() {
        assert_eq!(CollectorState::Running.to_string(), "running");
        assert!(CollectorState::Failed.is_terminal());
        assert!(!CollectorState::Stopping.is_terminal());
    }
}
