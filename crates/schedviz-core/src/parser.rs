//! `GODEBUG=schedtrace` line parser.
//!
//! Two grammars are recognised:
//!
//! ```text
//! SCHED 5000ms: gomaxprocs=8 idleprocs=6 threads=12 spinningthreads=1 needspinning=1 idlethreads=4 runqueue=5 [2 1 0 3 0 1 2 0]
//! PROCMETR num_goroutines=42
//! ```
//!
//! The first produces a [`SchedulerSnapshot`]. The second is a side-channel
//! line written by an in-process reporter; it never produces a snapshot but
//! its value is carried into every following snapshot until a newer one
//! arrives.
//!
//! A [`LineParser`] keeps that carried-over value as plain mutable state, so
//! one parser instance belongs to one stream. Two readers feeding the same
//! parser would interleave their side-channel values.

use std::sync::LazyLock;

use regex::Regex;

use crate::snapshot::SchedulerSnapshot;

/// Prefix of the primary trace line.
pub const TRACE_PREFIX: &str = "SCHED";

/// Prefix of the side-channel metrics line.
pub const SECONDARY_PREFIX: &str = "PROCMETR";

/// The only side-channel key we consume.
pub const SECONDARY_KEY: &str = "num_goroutines";

static TRACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^SCHED\s+",
        r"([0-9]+)ms:\s+",
        r"gomaxprocs=([0-9]+)\s+",
        r"idleprocs=([0-9]+)\s+",
        r"threads=([0-9]+)\s+",
        r"spinningthreads=([0-9]+)\s+",
        r"needspinning=([0-9]+)\s+",
        r"idlethreads=([0-9]+)\s+",
        r"runqueue=([0-9]+)\s+",
        r"\[([^\[\]]*)\]\s*$",
    ))
    .expect("trace regex is valid")
});

static SECONDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^PROCMETR\s+([A-Za-z_][A-Za-z0-9_]*)=([0-9]+)\s*$")
        .expect("secondary regex is valid")
});

const FIELD_NAMES: [&str; 8] = [
    "time",
    "gomaxprocs",
    "idleprocs",
    "threads",
    "spinningthreads",
    "needspinning",
    "idlethreads",
    "runqueue",
];

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a line did not become a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("not a trace line")]
    NotATraceLine,
    #[error("malformed trace line")]
    Malformed,
    #[error("field `{0}` out of range")]
    NumberOutOfRange(&'static str),
    #[error("bad local queue entry `{0}`")]
    BadQueueEntry(String),
    #[error("gomaxprocs is zero")]
    NoProcs,
    #[error("idleprocs {idle} exceeds gomaxprocs {max}")]
    IdleProcsExceedMax { idle: u64, max: u64 },
    #[error("expected {expected} local queues, found {found}")]
    QueueCountMismatch { expected: u64, found: usize },
    #[error("spinningthreads {spinning} exceeds threads {threads}")]
    SpinningExceedsThreads { spinning: u64, threads: u64 },
    #[error("idlethreads {idle} exceeds threads {threads}")]
    IdleThreadsExceedThreads { idle: u64, threads: u64 },
    #[error("all activity counters are zero")]
    SuspectAllZero,
    #[error("unknown side-channel key `{0}`")]
    UnknownSecondaryKey(String),
}

/// Result of feeding one line to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A valid trace line.
    Snapshot(SchedulerSnapshot),
    /// A side-channel line; the value is now carried into later snapshots.
    Secondary(u64),
    Rejected(RejectReason),
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Stateful line parser. See the module docs for the grammar.
#[derive(Debug, Default)]
pub struct LineParser {
    secondary: u64,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last side-channel value seen, or 0.
    pub fn secondary_count(&self) -> u64 {
        self.secondary
    }

    /// Parse one line, returning a snapshot only for valid trace lines.
    pub fn parse(&mut self, line: &str) -> Option<SchedulerSnapshot> {
        match self.parse_line(line) {
            LineOutcome::Snapshot(s) => Some(s),
            LineOutcome::Secondary(_) | LineOutcome::Rejected(_) => None,
        }
    }

    /// Parse one line and report exactly what happened to it.
    pub fn parse_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim_end_matches(['\r', '\n']);

        if has_prefix(line, SECONDARY_PREFIX) {
            return match parse_secondary(line) {
                Ok(value) => {
                    self.secondary = value;
                    LineOutcome::Secondary(value)
                }
                Err(reason) => LineOutcome::Rejected(reason),
            };
        }

        if !has_prefix(line, TRACE_PREFIX) {
            return LineOutcome::Rejected(RejectReason::NotATraceLine);
        }

        let parsed = parse_trace(line).and_then(|mut snapshot| {
            validate(&snapshot)?;
            snapshot.secondary_count = self.secondary;
            Ok(snapshot)
        });

        match parsed {
            Ok(snapshot) => LineOutcome::Snapshot(snapshot),
            Err(reason) => LineOutcome::Rejected(reason),
        }
    }
}

/// `prefix` followed by at least one whitespace character.
fn has_prefix(line: &str, prefix: &str) -> bool {
    line.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

fn parse_secondary(line: &str) -> Result<u64, RejectReason> {
    let caps = SECONDARY_RE.captures(line).ok_or(RejectReason::Malformed)?;
    let key = &caps[1];
    if key != SECONDARY_KEY {
        return Err(RejectReason::UnknownSecondaryKey(key.to_string()));
    }
    caps[2]
        .parse::<u64>()
        .map_err(|_| RejectReason::NumberOutOfRange(SECONDARY_KEY))
}

/// Structural parse only. `local_queue_sum` is computed here from the
/// bracket list; semantic checks live in [`validate`].
fn parse_trace(line: &str) -> Result<SchedulerSnapshot, RejectReason> {
    let caps = TRACE_RE.captures(line).ok_or(RejectReason::Malformed)?;

    let mut fields = [0u64; 8];
    for (i, &name) in FIELD_NAMES.iter().enumerate() {
        fields[i] = caps[i + 1]
            .parse::<u64>()
            .map_err(|_| RejectReason::NumberOutOfRange(name))?;
    }

    let local_queues = caps[9]
        .split_whitespace()
        .map(|entry| {
            // `u64::from_str` would also take a leading `+`.
            if !entry.bytes().all(|b| b.is_ascii_digit()) {
                return Err(RejectReason::BadQueueEntry(entry.to_string()));
            }
            entry
                .parse::<u64>()
                .map_err(|_| RejectReason::BadQueueEntry(entry.to_string()))
        })
        .collect::<Result<Vec<u64>, _>>()?;

    let local_queue_sum = local_queues
        .iter()
        .try_fold(0u64, |acc, &q| acc.checked_add(q))
        .ok_or(RejectReason::NumberOutOfRange("runqueue"))?;

    let [time_ms, max_procs, idle_procs, threads, spinning_threads, need_spinning, idle_threads, global_queue_len] =
        fields;

    Ok(SchedulerSnapshot {
        time_ms,
        max_procs,
        idle_procs,
        threads,
        spinning_threads,
        need_spinning,
        idle_threads,
        global_queue_len,
        local_queues,
        local_queue_sum,
        secondary_count: 0,
    })
}

/// Semantic checks on a structurally valid snapshot.
///
/// The all-zero rule rejects a line whose global queue, idle Ps, spinning
/// threads and local queue sum are all zero at once. A fully idle runtime
/// reports `idleprocs == gomaxprocs`, so it is never caught by this rule.
pub fn validate(s: &SchedulerSnapshot) -> Result<(), RejectReason> {
    if s.max_procs == 0 {
        return Err(RejectReason::NoProcs);
    }
    if s.idle_procs > s.max_procs {
        return Err(RejectReason::IdleProcsExceedMax {
            idle: s.idle_procs,
            max: s.max_procs,
        });
    }
    if s.local_queues.len() as u64 != s.max_procs {
        return Err(RejectReason::QueueCountMismatch {
            expected: s.max_procs,
            found: s.local_queues.len(),
        });
    }
    if s.spinning_threads > s.threads {
        return Err(RejectReason::SpinningExceedsThreads {
            spinning: s.spinning_threads,
            threads: s.threads,
        });
    }
    if s.idle_threads > s.threads {
        return Err(RejectReason::IdleThreadsExceedThreads {
            idle: s.idle_threads,
            threads: s.threads,
        });
    }
    if s.global_queue_len == 0
        && s.idle_procs == 0
        && s.spinning_threads == 0
        && s.local_queue_sum == 0
    {
        return Err(RejectReason::SuspectAllZero);
    }
    Ok(())
}
