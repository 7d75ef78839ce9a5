pub mod coordinator;
pub mod scheduler;

use serde::Serialize;

/// What triggered a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Manual,
    Scheduled,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Manual => "manual",
            RunKind::Scheduled => "scheduled",
        }
    }

    /// Ledger rows are trusted input; anything unrecognized reads back
    /// as manual rather than failing the whole history query.
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw {
            "scheduled" => RunKind::Scheduled,
            _ => RunKind::Manual,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(raw: &str) -> Self {
        match raw {
            "success" => RunStatus::Success,
            "partial" => RunStatus::Partial,
            _ => RunStatus::Failed,
        }
    }
}

/// One item that mapped but could not be written to the sink. Recorded,
/// never raised; a bad item must not fail the rest of the run.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    /// Source assignment id, or `None` when the whole run failed before
    /// reaching any item (bad credentials, auth rejection, timeout).
    pub assignment_id: Option<i64>,
    pub reason: String,
}

/// Outcome of one coordinator run, already persisted to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    /// Mapped items submitted to the sink. Skipped assignments
    /// (submitted, policy-filtered) are not counted.
    pub attempted: u64,
    pub succeeded: u64,
    pub failures: Vec<ItemFailure>,
}
