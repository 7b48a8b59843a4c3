//! Mapping `(communicator outcome, inspected container state)` to the
//! result record callers see. Exposed as a pure function so the test
//! suite can drive every edge case without a running engine.

use bollard::models::ContainerInspectResponse;
use chrono::{DateTime, Utc};

use crate::communicator::CommunicatorOutcome;

const SIGKILL: i64 = 9;
const SIGXCPU: i64 = 24;

/// `{exit_code, stdout, stderr, duration_s, timeout, oom_killed}` as
/// returned to the caller of `start`/`run`.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRunResult {
    pub exit_code: Option<i64>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_s: f64,
    pub timeout: bool,
    pub oom_killed: bool,
}

/// The subset of `docker inspect` fields the classifier needs,
/// extracted once so `classify` stays a pure function of plain data.
#[derive(Debug, Clone, Default)]
pub struct InspectedState {
    pub exit_code: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub oom_killed: bool,
}

impl InspectedState {
    pub fn from_inspect(inspect: &ContainerInspectResponse) -> Self {
        let state = inspect.state.as_ref();
        InspectedState {
            exit_code: state.and_then(|s| s.exit_code),
            started_at: state
                .and_then(|s| s.started_at.as_deref())
                .and_then(parse_docker_timestamp),
            finished_at: state
                .and_then(|s| s.finished_at.as_deref())
                .and_then(parse_docker_timestamp),
            oom_killed: state.and_then(|s| s.oom_killed).unwrap_or(false),
        }
    }

    /// `Node.Name` from inspect output, present only in Swarm mode.
    pub fn node_name(inspect: &ContainerInspectResponse) -> Option<String> {
        inspect
            .node
            .as_ref()
            .and_then(|node| node.name.clone())
    }
}

/// The engine emits a sentinel zero-value timestamp
/// (`"0001-01-01T00:00:00Z"`) for "never happened" instead of omitting
/// the field.
fn parse_docker_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Pure classification: given what the communicator observed and what
/// a post-mortem inspect reports, assemble the final result.
pub fn classify(outcome: CommunicatorOutcome, inspected: Option<InspectedState>) -> SandboxRunResult {
    match outcome {
        CommunicatorOutcome::TimedOut => SandboxRunResult {
            exit_code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            duration_s: -1.0,
            timeout: true,
            oom_killed: false,
        },
        CommunicatorOutcome::Completed { stdout, stderr } => {
            let inspected = inspected.unwrap_or_default();
            let duration_s = duration_seconds(inspected.started_at, inspected.finished_at);
            let timeout = is_killed_by_sigkill_or_sigxcpu(inspected.exit_code) && !inspected.oom_killed;

            SandboxRunResult {
                exit_code: inspected.exit_code,
                stdout,
                stderr,
                duration_s,
                timeout,
                oom_killed: inspected.oom_killed,
            }
        }
    }
}

/// Wall-clock duration of the run. Negative `finished_at - started_at`
/// is a known engine oddity; clamp to `-1` rather than raising.
fn duration_seconds(started_at: Option<DateTime<Utc>>, finished_at: Option<DateTime<Utc>>) -> f64 {
    match (started_at, finished_at) {
        (Some(start), Some(end)) => {
            let delta = (end - start).num_milliseconds() as f64 / 1000.0;
            if delta < 0.0 {
                -1.0
            } else {
                delta
            }
        }
        _ => -1.0,
    }
}

/// Distinguishes a CPU-rlimit kill or external kill from memory
/// exhaustion, which carries its own `oom_killed` flag instead.
fn is_killed_by_sigkill_or_sigxcpu(exit_code: Option<i64>) -> bool {
    match exit_code {
        Some(code) => {
            let signal = code - 128;
            signal == SIGKILL || signal == SIGXCPU
        }
        None => false,
    }
}

/// Cap `stdout`/`stderr` to a short prefix plus a truncation marker,
/// for logging only — never applied to the value returned to the
/// caller.
pub fn truncated_for_log(bytes: &[u8]) -> String {
    const LOG_TRUNCATE_LEN: usize = 100;
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= LOG_TRUNCATE_LEN {
        text.into_owned()
    } else {
        format!("{}*** truncated ***", &text[..LOG_TRUNCATE_LEN])
    }
}
