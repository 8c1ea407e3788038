//! Error taxonomy for the orchestrator.
//!
//! [`RunnerError`] is what callers see; [`BackendError`] is the shared
//! failure type at the collaborator seams (compute, log, and blob
//! backends). Blob-cleanup failures never appear here at all: they are
//! logged as warnings so a partial cleanup cannot mask the job's real
//! outcome.

use std::time::Duration;

use crate::status::JobStatus;

/// A failure of one orchestrated run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Invalid or unusable configuration, detected before any remote
    /// job resource is created.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A queue did not reach the VALID status within its wait window.
    ///
    /// Raised both when a freshly created single-use queue never
    /// becomes ready and when a disabled queue never settles during
    /// teardown.
    #[error("job queue {queue} did not become ready within {timeout:?}")]
    QueueReadinessTimeout { queue: String, timeout: Duration },

    /// The job ended in a non-success terminal status, or the overall
    /// completion timeout elapsed while it was still transient.
    #[error(
        "job {job_name} ended with status {status} (exit code {exit_code}, \
         {stdout_lines} stdout / {stderr_lines} stderr lines captured)"
    )]
    JobOutcome {
        job_name: String,
        /// Last status observed by the polling loop.
        status: JobStatus,
        /// Mapped per the exit-code contract.
        exit_code: i32,
        stdout_lines: u64,
        stderr_lines: u64,
    },

    /// A staged file upload or download failed.
    #[error("file transfer failed: {0}")]
    Transfer(String),

    /// A backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A failure at one of the backend seams.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The remote API rejected or failed the call.
    #[error("backend api error: {0}")]
    Api(String),

    /// A request could not be assembled from local data.
    #[error("malformed backend request: {0}")]
    InvalidRequest(String),

    /// The backend response lacked a field the orchestrator relies on.
    #[error("backend response missing {0}")]
    MissingField(&'static str),

    /// Reading or writing a local file failed during a transfer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
