//! CLI for schedviz: watch the Go scheduler breathe.

mod commands;
mod tui;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "schedviz")]
#[command(about = "schedviz: live dashboard for GODEBUG=schedtrace output")]
#[command(version = schedviz_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every dashboard-driving subcommand.
#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    /// Dashboard refresh interval in milliseconds
    #[arg(long, default_value_t = schedviz_core::DEFAULT_REFRESH_MS)]
    pub refresh: u64,

    /// Number of snapshots kept in the rolling history
    #[arg(long, default_value_t = schedviz_core::HISTORY_CAPACITY)]
    pub history: usize,

    /// Print one summary line per refresh instead of drawing the TUI
    #[arg(long)]
    pub headless: bool,

    /// Write logs to this file (RUST_LOG controls the level)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Go program (binary, .go file or package directory) with
    /// scheduler tracing enabled and watch it live
    Monitor {
        /// Executable, Go source file, or Go package directory
        target: PathBuf,

        /// Arguments passed through to the target
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// schedtrace period in milliseconds
        #[arg(long, default_value_t = schedviz_core::DEFAULT_PERIOD_MS)]
        period: u64,

        /// Command used to launch the target, e.g. "go run" (default for
        /// .go files and directories)
        #[arg(long)]
        launcher: Option<String>,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Read schedtrace lines from stdin, e.g.
    /// `GODEBUG=schedtrace=1000 ./app 2>&1 >/dev/null | schedviz attach`
    Attach {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Replay a captured schedtrace log
    Replay {
        /// Log file containing SCHED lines
        file: PathBuf,

        /// Delay between snapshots in milliseconds (0 = as fast as possible)
        #[arg(long, default_value = "0")]
        pace: u64,

        #[command(flatten)]
        view: ViewArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            target,
            args,
            period,
            launcher,
            view,
        } => commands::monitor::run(target, args, period, launcher.as_deref(), &view),
        Commands::Attach { view } => commands::attach::run(&view),
        Commands::Replay { file, pace, view } => commands::replay::run(file, pace, &view),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_passes_trailing_args_through() {
        let cli = Cli::try_parse_from([
            "schedviz", "monitor", "--period", "250", "./app", "-workers", "8",
        ])
        .unwrap();
        match cli.command {
            Commands::Monitor {
                target,
                args,
                period,
                view,
                ..
            } => {
                assert_eq!(target, PathBuf::from("./app"));
                assert_eq!(args, vec!["-workers", "8"]);
                assert_eq!(period, 250);
                assert_eq!(view.refresh, 500);
                assert_eq!(view.history, 60);
                assert!(!view.headless);
            }
            _ => panic!("expected monitor"),
        }
    }

    #[test]
    fn monitor_requires_a_target() {
        assert!(Cli::try_parse_from(["schedviz", "monitor"]).is_err());
    }

    #[test]
    fn replay_flags() {
        let cli = Cli::try_parse_from([
            "schedviz", "replay", "trace.log", "--pace", "100", "--headless",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay { file, pace, view } => {
                assert_eq!(file, PathBuf::from("trace.log"));
                assert_eq!(pace, 100);
                assert!(view.headless);
            }
            _ => panic!("expected replay"),
        }
    }
}
