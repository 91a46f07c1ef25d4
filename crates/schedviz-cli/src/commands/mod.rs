pub mod attach;
pub mod headless;
pub mod monitor;
pub mod replay;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use schedviz_core::{
    Collector, CollectorError, MonitorConfig, PipelineExit, StateStore, run_pipeline,
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::ViewArgs;
use crate::tui::app::App;

/// How long blocked I/O (e.g. a stdin read) may delay exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Set up `env_logger`.
///
/// The TUI owns the terminal, so without `--log-file` nothing is logged
/// there. Headless runs log to stderr at `info` unless `RUST_LOG` says
/// otherwise.
pub fn init_logging(view: &ViewArgs) {
    if !view.headless && view.log_file.is_none() {
        return;
    }
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(path) = &view.log_file {
        match std::fs::File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Error opening log file {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }

    let _ = builder.try_init();
}

pub fn monitor_config(view: &ViewArgs) -> MonitorConfig {
    MonitorConfig {
        refresh_ms: view.refresh,
        history_capacity: view.history,
    }
}

/// Drive `collector` into the TUI or the headless printer until the stream
/// ends, the user quits, or Ctrl+C arrives. Exits the process on error.
pub fn run_dashboard(collector: Box<dyn Collector>, view: &ViewArgs, title: String) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };

    let config = monitor_config(view);
    let store = Arc::new(StateStore::with_capacity(config.history_capacity));
    let cancel = CancellationToken::new();

    // Raw mode swallows SIGINT in the TUI; the key handler covers that case.
    let on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_signal.cancel()) {
        log::warn!("could not install Ctrl+C handler: {e}");
    }

    let result = if view.headless {
        let mut collector = collector;
        let mut presenter = headless::HeadlessPresenter::new(io::stdout());
        runtime.block_on(run_pipeline(
            collector.as_mut(),
            store,
            &mut presenter,
            config.refresh(),
            cancel,
        ))
    } else {
        run_tui(&runtime, collector, store, config, cancel, title)
    };

    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    match result {
        Ok(exit) => {
            if !view.headless {
                println!("{}", exit_summary(&exit));
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_tui(
    runtime: &Runtime,
    mut collector: Box<dyn Collector>,
    store: Arc<StateStore>,
    config: MonitorConfig,
    cancel: CancellationToken,
    title: String,
) -> Result<PipelineExit, CollectorError> {
    let mut app = App::new(title, cancel.clone());
    let mut presenter = app.presenter();
    let token = cancel.clone();

    let task = runtime.spawn(async move {
        let result = run_pipeline(
            collector.as_mut(),
            store,
            &mut presenter,
            config.refresh(),
            token,
        )
        .await;
        if let Err(e) = &result {
            presenter.fail(e);
        }
        result
    });

    let ui = app.run();
    cancel.cancel();
    let result = runtime.block_on(task);

    if let Err(e) = ui {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
    match result {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Collector task failed: {e}");
            std::process::exit(1);
        }
    }
}

pub fn exit_summary(exit: &PipelineExit) -> String {
    let how = match exit.reason {
        schedviz_core::ExitReason::StreamEnded => "trace ended",
        schedviz_core::ExitReason::Cancelled => "stopped",
    };
    format!(
        "{how}: {} snapshots from {} lines ({} rejected, {} goroutine reports)",
        exit.received, exit.stats.lines, exit.stats.rejected, exit.stats.secondary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedviz_core::{ExitReason, StatsSnapshot};

    #[test]
    fn summary_mentions_counts() {
        let exit = PipelineExit {
            reason: ExitReason::StreamEnded,
            received: 4,
            stats: StatsSnapshot {
                lines: 12,
                snapshots: 4,
                rejected: 6,
                secondary: 2,
            },
        };
        assert_eq!(
            exit_summary(&exit),
            "trace ended: 4 snapshots from 12 lines (6 rejected, 2 goroutine reports)"
        );
    }

    #[test]
    fn monitor_config_from_flags() {
        let view = ViewArgs {
            refresh: 0,
            history: 10,
            headless: true,
            log_file: None,
        };
        let cfg = monitor_config(&view);
        assert_eq!(cfg.history_capacity, 10);
        assert_eq!(cfg.refresh(), Duration::from_millis(1));
    }
}
