//! Remote job status and its exit-code contract.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the compute backend for a submitted job.
///
/// `Succeeded` and `Failed` are terminal; every other status is
/// transient and must leave this set before the completion timeout, or
/// the run is treated as a timeout failure. `Unknown` covers statuses
/// the backend may add that this crate does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl JobStatus {
    /// Whether the backend will never move the job out of this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Exit code reported for a run that ended in this status.
    ///
    /// The mapping is part of the public contract and must stay
    /// bit-exact: SUCCEEDED=0, FAILED=1, RUNNING=2, RUNNABLE=3,
    /// PENDING=4, STARTING=5, SUBMITTED=6, anything else -1.
    pub fn exit_code(self) -> i32 {
        match self {
            JobStatus::Succeeded => 0,
            JobStatus::Failed => 1,
            JobStatus::Running => 2,
            JobStatus::Runnable => 3,
            JobStatus::Pending => 4,
            JobStatus::Starting => 5,
            JobStatus::Submitted => 6,
            JobStatus::Unknown => -1,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Pending => "PENDING",
            JobStatus::Runnable => "RUNNABLE",
            JobStatus::Starting => "STARTING",
            JobStatus::Running => "RUNNING",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}
