//! Domain types shared by the submission service, the worker, and both
//! backends (`sat-store`, `sat-broker`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default solver timeout for plain RPN formulas (spec TIMEOUT_S_SAT).
pub const TIMEOUT_S_SAT: i64 = 10;
/// Default solver timeout for Sudoku-encoded CNF formulas (spec TIMEOUT_S_SUDOKU).
pub const TIMEOUT_S_SUDOKU: i64 = 250;

/// Selects the solver variant and its default timeout.
///
/// A closed variant set indexing a static timeout table, rather than a
/// runtime-polymorphic "solver strategy" object: adding a mode is a data
/// change (new variant + new table entry), not a new trait impl wired in
/// from several call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverMode {
    Rpn,
    CnfSudoku,
}

impl SolverMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "RPN" => Some(SolverMode::Rpn),
            "CNF_SUDOKU" => Some(SolverMode::CnfSudoku),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverMode::Rpn => "RPN",
            SolverMode::CnfSudoku => "CNF_SUDOKU",
        }
    }

    /// Default timeout (seconds) for this mode, per spec §4.4 step 5.
    pub fn default_timeout_s(&self) -> i64 {
        match self {
            SolverMode::Rpn => TIMEOUT_S_SAT,
            SolverMode::CnfSudoku => TIMEOUT_S_SUDOKU,
        }
    }
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run lifecycle status.
///
/// Progresses monotonically along `Created < Queued < Processing <
/// {Completed, Failed, Timeout, Cancelled}`. Once a run reaches a terminal
/// variant it is never mutated again. Modeled as an explicit, ordered state
/// machine rather than a bare string column, mirroring the teacher's
/// `OrderState`/`TransitionError` pattern for OMS order lifecycles: illegal
/// transitions are a programming error the caller must treat as a bug, not
/// a recoverable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Created,
    Queued,
    Processing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl RunStatus {
    /// Rank along the monotonic ordering. Terminal statuses all share a
    /// single rank since spec.md imposes no ordering among them.
    fn rank(self) -> u8 {
        match self {
            RunStatus::Created => 0,
            RunStatus::Queued => 1,
            RunStatus::Processing => 2,
            RunStatus::Completed
            | RunStatus::Failed
            | RunStatus::Timeout
            | RunStatus::Cancelled => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Created | RunStatus::Queued | RunStatus::Processing)
    }

    /// Returns `Ok(())` if moving from `self` to `next` respects the
    /// monotonic ordering, else a [`TransitionError`] describing the
    /// illegal move.
    pub fn validate_transition(self, next: RunStatus) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError { from: self, to: next });
        }
        if next.rank() < self.rank() {
            return Err(TransitionError { from: self, to: next });
        }
        Ok(())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Created => "CREATED",
            RunStatus::Queued => "QUEUED",
            RunStatus::Processing => "PROCESSING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Timeout => "TIMEOUT",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CREATED" => Some(RunStatus::Created),
            "QUEUED" => Some(RunStatus::Queued),
            "PROCESSING" => Some(RunStatus::Processing),
            "COMPLETED" => Some(RunStatus::Completed),
            "FAILED" => Some(RunStatus::Failed),
            "TIMEOUT" => Some(RunStatus::Timeout),
            "CANCELLED" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a caller attempts an illegal status transition.
///
/// **Callers MUST treat this as a bug signal.** A monotonicity violation
/// means two actors raced to write a Run's status outside the claim/ack
/// protocol that is supposed to serialize them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: RunStatus,
    pub to: RunStatus,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal run status transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// An immutable, content-addressed formula row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    pub id: i64,
    pub normalized_input: String,
    pub hash: String,
    pub notation: String,
}

/// One attempt at solving a formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub formula_id: i64,
    pub status: RunStatus,
    pub timeout_s: i64,
    pub mode: SolverMode,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The decision a solver invocation reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveDecision {
    Sat,
    Unsat,
    Error,
    Timeout,
}

impl SolveDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveDecision::Sat => "SAT",
            SolveDecision::Unsat => "UNSAT",
            SolveDecision::Error => "ERROR",
            SolveDecision::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for SolveDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A satisfying assignment. `BTreeMap` keeps iteration order deterministic
/// for serialization/logging even though the spec says key order carries no
/// meaning.
pub type Assignment = BTreeMap<String, bool>;

/// Outcome of a terminal Run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveResult {
    pub run_id: i64,
    pub result: SolveDecision,
    pub assignment: Option<Assignment>,
    pub stdout: String,
    pub stderr: String,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub runtime_s: f64,
}

/// The payload a job carries through the Broker, mirroring spec §3's
/// `job:{run_id}:payload` JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub formula: String,
    pub run_id: i64,
    pub formula_id: i64,
    pub mode: SolverMode,
    pub timeout_s: i64,
}

/// Broker-side per-job metadata (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMeta {
    pub attempts: u32,
    pub created_at: i64,
    pub last_claimed_at: i64,
    pub failed_at: Option<i64>,
    pub last_error: Option<String>,
}
