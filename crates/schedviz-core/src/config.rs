//! Collector and monitor configuration.
//!
//! Both structs are plain serde values so a front end can build them from
//! flags, files or tests alike. [`CollectorConfig::validate`] performs every
//! precondition check without spawning anything.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CollectorError;
use crate::state::HISTORY_CAPACITY;

/// Environment variable that switches on the runtime's scheduler trace.
pub const GODEBUG_ENV: &str = "GODEBUG";

/// Default `schedtrace` period.
pub const DEFAULT_PERIOD_MS: u64 = 1000;

/// Default dashboard refresh interval.
pub const DEFAULT_REFRESH_MS: u64 = 500;

/// Launcher used for Go sources when none is configured.
pub const GO_RUN: [&str; 2] = ["go", "run"];

// ---------------------------------------------------------------------------
// CollectorConfig
// ---------------------------------------------------------------------------

/// What to run and how often it should emit trace lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Executable, Go source file, or Go package directory.
    pub target: PathBuf,
    /// Extra arguments passed to the target.
    pub args: Vec<String>,
    /// Command prefix used to run the target, e.g. `["go", "run"]`.
    pub launcher: Option<Vec<String>>,
    /// `schedtrace` period in milliseconds.
    pub period_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            target: PathBuf::new(),
            args: Vec::new(),
            launcher: None,
            period_ms: DEFAULT_PERIOD_MS,
        }
    }
}

/// A validated command line ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub period_ms: u64,
}

impl LaunchPlan {
    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl CollectorConfig {
    pub fn new(target: impl Into<PathBuf>, period_ms: u64) -> Self {
        Self {
            target: target.into(),
            period_ms,
            ..Default::default()
        }
    }

    /// Check the target and period and work out the command to spawn.
    pub fn validate(&self) -> Result<LaunchPlan, CollectorError> {
        if self.target.as_os_str().is_empty() {
            return Err(CollectorError::EmptyTarget);
        }
        if self.period_ms == 0 {
            return Err(CollectorError::InvalidPeriod(self.period_ms));
        }

        let meta = fs::metadata(&self.target).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CollectorError::TargetNotFound(self.target.clone()),
            _ => CollectorError::TargetNotReadable {
                path: self.target.clone(),
                source: e,
            },
        })?;

        let readable = if meta.is_dir() {
            fs::read_dir(&self.target).map(drop)
        } else {
            fs::File::open(&self.target).map(drop)
        };
        readable.map_err(|source| CollectorError::TargetNotReadable {
            path: self.target.clone(),
            source,
        })?;

        let launcher = self.launcher.clone().filter(|l| !l.is_empty()).or_else(|| {
            (meta.is_dir() || is_go_source(&self.target))
                .then(|| GO_RUN.iter().map(|s| s.to_string()).collect())
        });

        let target_args = self.args.iter().map(OsString::from);
        match launcher {
            Some(launcher) => {
                let mut words = launcher.into_iter().map(OsString::from);
                let program = words.next().unwrap_or_default();
                let args = words
                    .chain(std::iter::once(self.target.clone().into_os_string()))
                    .chain(target_args)
                    .collect();
                Ok(LaunchPlan {
                    program,
                    args,
                    period_ms: self.period_ms,
                })
            }
            None => {
                if meta.is_dir() || !is_executable(&meta) {
                    return Err(CollectorError::TargetNotExecutable(self.target.clone()));
                }
                Ok(LaunchPlan {
                    program: self.target.clone().into_os_string(),
                    args: target_args.collect(),
                    period_ms: self.period_ms,
                })
            }
        }
    }
}

fn is_go_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "go")
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(meta: &fs::Metadata) -> bool {
    meta.is_file()
}

/// Merge `schedtrace=<period>` into an inherited `GODEBUG` value.
///
/// Other comma-separated settings are kept in order; any previous
/// `schedtrace` entry is replaced.
pub fn godebug_value(existing: Option<&str>, period_ms: u64) -> String {
    let mut parts: Vec<String> = existing
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.starts_with("schedtrace="))
        .map(str::to_string)
        .collect();
    parts.push(format!("schedtrace={period_ms}"));
    parts.join(",")
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

/// Consumer-side settings: refresh cadence and rolling window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub refresh_ms: u64,
    pub history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_ms: DEFAULT_REFRESH_MS,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

impl MonitorConfig {
    /// Refresh interval, never shorter than one millisecond.
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(1))
    }
}
