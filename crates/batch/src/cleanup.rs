//! Teardown of every ephemeral resource a run created.
//!
//! The [`CleanupPlan`] is filled in incrementally as resources come
//! into existence and consumed exactly once at the end of the run,
//! whatever exit path was taken. Queue and job-definition teardown
//! errors propagate to the caller; staged-blob cleanup is best-effort
//! and only ever logs a warning.

use std::time::Duration;

use crate::backend::{BlobStore, ComputeBackend, JobQueueStatus};
use crate::error::{BackendError, RunnerError};
use crate::staging::StagingPlan;

/// Poll interval for queue status transitions.
pub(crate) const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Overall window for a queue to reach VALID, on creation and on
/// disable.
pub(crate) const QUEUE_UPDATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend batch-delete limit, in keys per call.
const MAX_DELETE_BATCH: usize = 1000;

/// What the run has created so far and must therefore tear down.
#[derive(Debug, Default, Clone)]
pub struct CleanupPlan {
    /// Set as soon as registration succeeds; always deregistered.
    pub job_definition_arn: Option<String>,
    /// Set only when this run created the queue. A caller-supplied
    /// queue is never touched.
    pub created_queue_arn: Option<String>,
    /// Present iff the run staged files; its working prefix is
    /// deleted.
    pub staging: Option<StagingPlan>,
}

/// Poll every 500 ms until the queue status is VALID, up to 1 minute.
///
/// Used both for creation readiness and for the settle after a
/// disable.
pub(crate) async fn await_queue_update(
    compute: &dyn ComputeBackend,
    queue: &str,
) -> Result<(), RunnerError> {
    let deadline = tokio::time::Instant::now() + QUEUE_UPDATE_TIMEOUT;
    loop {
        if compute.job_queue_status(queue).await? == JobQueueStatus::Valid {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(RunnerError::QueueReadinessTimeout {
                queue: queue.to_owned(),
                timeout: QUEUE_UPDATE_TIMEOUT,
            });
        }
        tokio::time::sleep(QUEUE_POLL_INTERVAL).await;
    }
}

/// Tear down the single-use job queue (when this run created one) and
/// the job definition.
///
/// Errors here propagate to the caller and can therefore mask an
/// earlier job failure; see DESIGN.md for why this divergence from the
/// blob-side policy is kept.
pub(crate) async fn teardown_batch(
    compute: &dyn ComputeBackend,
    plan: &CleanupPlan,
) -> Result<(), RunnerError> {
    if let Some(queue) = &plan.created_queue_arn {
        tracing::debug!(queue, "Disabling single-use job queue");
        compute.disable_job_queue(queue).await?;
        await_queue_update(compute, queue).await?;
        compute.delete_job_queue(queue).await?;
        tracing::debug!(queue, "Job queue deleted");
    }

    if let Some(job_definition) = &plan.job_definition_arn {
        compute.deregister_job_definition(job_definition).await?;
        tracing::debug!(job_definition, "Job definition deregistered");
    }
    Ok(())
}

/// Delete every staged object under the run's working prefix.
///
/// Never fails: a partial blob cleanup must not mask the job's real
/// outcome, so problems are logged and swallowed.
pub(crate) async fn cleanup_blobs(blobs: &dyn BlobStore, plan: &StagingPlan) {
    if let Err(e) = try_cleanup_blobs(blobs, plan).await {
        tracing::warn!(
            error = %e,
            prefix = %plan.working_key_prefix(),
            "Failed to clean up staged blob objects",
        );
    }
}

async fn try_cleanup_blobs(blobs: &dyn BlobStore, plan: &StagingPlan) -> Result<(), BackendError> {
    let keys = blobs
        .list_keys(&plan.bucket, &plan.working_key_prefix())
        .await?;
    for chunk in keys.chunks(MAX_DELETE_BATCH) {
        blobs.delete_objects(&plan.bucket, chunk).await?;
    }
    if !keys.is_empty() {
        tracing::debug!(
            count = keys.len(),
            prefix = %plan.working_key_prefix(),
            "Deleted staged blob objects",
        );
    }
    Ok(())
}
