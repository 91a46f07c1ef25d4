//! Collector that spawns the target with scheduler tracing enabled.

use std::process::Stdio;

use log::{debug, info, warn};
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    Collector, CollectorState, Lifecycle, SNAPSHOT_CHANNEL_CAPACITY, SnapshotStream,
    StatsSnapshot, StopHandle, read_loop,
};
use crate::config::{CollectorConfig, GODEBUG_ENV, godebug_value};
use crate::error::CollectorError;

/// Runs the target program and parses its stderr.
///
/// The child is killed when the read loop ends for any reason: explicit
/// stop, cancellation, or the stream closing on its own. Its stdout is
/// discarded so it cannot scribble over the dashboard.
pub struct ProcessCollector {
    config: CollectorConfig,
    lifecycle: Lifecycle,
    task: Option<JoinHandle<()>>,
}

impl ProcessCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::new(),
            task: None,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Wait for the background task (and therefore the child) to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("collector task panicked: {e}");
        }
    }
}

impl Collector for ProcessCollector {
    fn start(&mut self, cancel: CancellationToken) -> Result<SnapshotStream, CollectorError> {
        self.lifecycle.begin()?;

        let plan = self
            .config
            .validate()
            .map_err(|e| self.lifecycle.fail(e))?;

        let godebug = godebug_value(std::env::var(GODEBUG_ENV).ok().as_deref(), plan.period_ms);
        let mut command = Command::new(&plan.program);
        command
            .args(&plan.args)
            .env(GODEBUG_ENV, &godebug)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so `go run` and whatever it builds die together.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| {
                self.lifecycle.fail(CollectorError::Spawn {
                    program: plan.display(),
                    source,
                })
            })?;

        let Some(stderr) = child.stderr.take() else {
            kill_tree(&mut child);
            return Err(self.lifecycle.fail(CollectorError::MissingStderr));
        };

        info!(
            "started `{}` (pid {}) with {GODEBUG_ENV}={godebug}",
            plan.display(),
            child.id().map_or_else(|| "?".to_string(), |p| p.to_string())
        );

        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        let shutdown = self.lifecycle.shutdown(cancel);
        let lifecycle = self.lifecycle.clone();
        let stats = std::sync::Arc::clone(self.lifecycle.stats());
        self.lifecycle.running();

        self.task = Some(tokio::spawn(async move {
            let exit = read_loop(BufReader::new(stderr), tx, shutdown, stats, None).await;
            debug!("read loop ended: {exit:?}");
            lifecycle.set(CollectorState::Stopping);

            kill_tree(&mut child);
            match child.wait().await {
                Ok(status) => info!("target exited: {status}"),
                Err(e) => warn!("failed to reap target: {e}"),
            }
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

/// SIGKILL the child's whole process group, then the child itself.
///
/// Best effort: either may already be gone.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall; `pid` leads the group created at spawn.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!("killpg({pid}): {}", std::io::Error::last_os_error());
        }
    }
    if let Err(e) = child.start_kill() {
        debug!("kill after read loop: {e}");
    }
}
