//! Errors surfaced synchronously from collector startup.
//!
//! Malformed trace lines are not errors (see [`crate::parser::RejectReason`]),
//! and read failures after startup only reach the log.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("no target program given")]
    EmptyTarget,
    #[error("target {} does not exist", .0.display())]
    TargetNotFound(PathBuf),
    #[error("target {} is not readable: {source}", .path.display())]
    TargetNotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("target {} is not executable", .0.display())]
    TargetNotExecutable(PathBuf),
    #[error("trace period must be a positive number of milliseconds, got {0}")]
    InvalidPeriod(u64),
    #[error("collector already started")]
    AlreadyStarted,
    #[error("collector was stopped")]
    Stopped,
    #[error("failed to start process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to get stderr pipe of the target process")]
    MissingStderr,
    #[error("failed to open trace file {}: {source}", .path.display())]
    Replay {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CollectorError {
    /// True for errors caused by bad configuration rather than the OS.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::EmptyTarget
                | Self::TargetNotFound(_)
                | Self::TargetNotReadable { .. }
                | Self::TargetNotExecutable(_)
                | Self::InvalidPeriod(_)
        )
    }
}
