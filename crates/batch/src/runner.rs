//! Job lifecycle orchestration: register, submit, poll, map, clean up.
//!
//! [`BatchRunner::run`] drives one job end to end. The polling loop
//! and the live log tail run concurrently; staged uploads complete
//! before submission and downloads before cleanup; and cleanup runs on
//! every exit path once remote resources may exist.

use std::sync::Arc;
use std::time::Duration;

use strato_core::ids;
use strato_core::log::{CountingSink, LogSink};
use tokio_util::sync::CancellationToken;

use crate::aws;
use crate::backend::{
    BlobStore, ComputeBackend, JobSubmission, LiveTail, LogBackend,
};
use crate::cleanup::{self, CleanupPlan};
use crate::config::{BatchConfig, ScriptTask};
use crate::error::{BackendError, RunnerError};
use crate::staging::{self, StagingPlan};
use crate::status::JobStatus;
use crate::tail;
use crate::topology;

/// Interval between job status polls.
const JOB_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Log group the backend writes batch job streams into.
const LOG_GROUP_NAME: &str = "/aws/batch/job";

/// Priority assigned to single-use job queues.
const SINGLE_USE_QUEUE_PRIORITY: i32 = 10;

/// Result of one status poll, interpreted by the loop driver.
enum PollVerdict {
    Continue(JobStatus),
    Succeeded,
    Failed(JobStatus),
}

/// Result of a successful run.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// Always 0; failures surface as [`RunnerError::JobOutcome`] with
    /// the mapped code instead.
    pub exit_code: i32,
    pub stdout_lines: u64,
    pub stderr_lines: u64,
}

/// Runs one script task as a remote batch job per invocation.
///
/// The backends are trait objects so the whole lifecycle can be
/// exercised against in-memory fakes.
pub struct BatchRunner {
    config: BatchConfig,
    compute: Arc<dyn ComputeBackend>,
    logs: Arc<dyn LogBackend>,
    blobs: Arc<dyn BlobStore>,
}

impl BatchRunner {
    pub fn new(
        config: BatchConfig,
        compute: Arc<dyn ComputeBackend>,
        logs: Arc<dyn LogBackend>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            compute,
            logs,
            blobs,
        }
    }

    /// Build a runner wired to AWS, resolving region and credentials
    /// from the configuration.
    pub async fn connect(config: BatchConfig) -> Self {
        let sdk_config = aws::Connection::new(&config).sdk_config().await;
        let compute = Arc::new(aws::AwsComputeBackend::new(&sdk_config));
        let logs = Arc::new(aws::AwsLogBackend::new(&sdk_config));
        let blobs = Arc::new(aws::AwsBlobStore::new(&sdk_config));
        Self::new(config, compute, logs, blobs)
    }

    /// Execute one task to completion.
    ///
    /// On success the outcome carries exit code 0 plus the captured
    /// log-line counts. Every failure after job-definition
    /// registration still runs the full teardown; note that a
    /// queue/definition teardown error takes precedence over the run's
    /// own error (see DESIGN.md).
    pub async fn run(
        &self,
        task: &ScriptTask,
        sink: Arc<dyn LogSink>,
    ) -> Result<RunOutcome, RunnerError> {
        let staging = self.staging_plan(task)?;
        let sink = CountingSink::new(sink);

        let environment = self
            .compute
            .describe_compute_environment(&self.config.compute_environment_arn)
            .await?
            .ok_or_else(|| {
                RunnerError::Configuration(format!(
                    "compute environment not found: {}",
                    self.config.compute_environment_arn
                ))
            })?;

        let job_name = ids::job_name(&task.name);
        let topology = topology::build(
            &self.config,
            task,
            staging.as_ref(),
            &environment,
            &job_name,
        )?;

        // Uploads must all complete before anything is submitted.
        if let Some(plan) = &staging {
            staging::upload_all(self.blobs.as_ref(), plan, &task.working_directory).await?;
        }

        let mut plan = CleanupPlan {
            staging: staging.clone(),
            ..CleanupPlan::default()
        };
        let mut tail_cancel: Option<CancellationToken> = None;

        let outcome = self
            .launch(task, &topology, staging.as_ref(), &job_name, &sink, &mut plan, &mut tail_cancel)
            .await;

        let teardown = cleanup::teardown_batch(self.compute.as_ref(), &plan).await;
        // The tail connection is closed only now, so trailing log
        // delivery after the terminal status still reaches the sink.
        if let Some(cancel) = tail_cancel {
            cancel.cancel();
        }
        if let Some(staged) = &plan.staging {
            cleanup::cleanup_blobs(self.blobs.as_ref(), staged).await;
        }

        teardown?;
        outcome?;

        Ok(RunOutcome {
            exit_code: 0,
            stdout_lines: sink.stdout_count(),
            stderr_lines: sink.stderr_count(),
        })
    }

    /// Everything from registration to download. Failures in here
    /// still flow through teardown in [`run`].
    #[allow(clippy::too_many_arguments)]
    async fn launch(
        &self,
        task: &ScriptTask,
        topology: &topology::JobTopology,
        staging: Option<&StagingPlan>,
        job_name: &str,
        sink: &Arc<CountingSink>,
        plan: &mut CleanupPlan,
        tail_cancel: &mut Option<CancellationToken>,
    ) -> Result<(), RunnerError> {
        // Fresh name per attempt; registration is not idempotent.
        let job_definition_name = ids::create();
        tracing::debug!(job_definition_name, "Registering job definition");
        let job_definition_arn = self
            .compute
            .register_job_definition(&job_definition_name, topology)
            .await?;
        plan.job_definition_arn = Some(job_definition_arn.clone());
        tracing::debug!(job_definition = %job_definition_arn, "Job definition registered");

        let job_queue_arn = match &self.config.job_queue_arn {
            Some(arn) => arn.clone(),
            None => {
                tracing::debug!("Job queue not specified, creating a single-use queue");
                let arn = self
                    .compute
                    .create_job_queue(
                        &ids::create(),
                        &self.config.compute_environment_arn,
                        SINGLE_USE_QUEUE_PRIORITY,
                    )
                    .await?;
                plan.created_queue_arn = Some(arn.clone());
                cleanup::await_queue_update(self.compute.as_ref(), &arn).await?;
                tracing::debug!(queue = %arn, "Job queue created");
                arn
            }
        };

        // Start the tail before submission so no early output is
        // missed; the consumer task runs until the channel closes.
        let live_tail = self.start_tail(job_name).await?;
        *tail_cancel = Some(live_tail.cancel.clone());
        tokio::spawn(tail::consume(live_tail.events, Arc::clone(sink)));

        let submission = JobSubmission {
            job_name: job_name.to_owned(),
            job_queue_arn,
            job_definition_arn,
            timeout_seconds: self.config.wait_until_completion.as_secs() as i64,
        };
        let job_id = self.compute.submit_job(&submission).await?;
        tracing::debug!(job_id, job_name, "Job submitted");

        self.poll_to_completion(&job_id, job_name, sink).await?;

        // Downloads run only after a successful terminal status and
        // must all complete before cleanup begins.
        if let Some(staged) = staging {
            staging::download_all(
                self.blobs.as_ref(),
                staged,
                &task.working_directory,
                &task.output_directory,
            )
            .await?;
        }
        Ok(())
    }

    /// Poll every 500 ms until terminal or the completion timeout.
    ///
    /// FAILED short-circuits immediately; a timeout with the job still
    /// transient maps that transient status, not FAILED.
    async fn poll_to_completion(
        &self,
        job_id: &str,
        job_name: &str,
        sink: &CountingSink,
    ) -> Result<(), RunnerError> {
        let deadline = tokio::time::Instant::now() + self.config.wait_until_completion;
        let mut last_status;

        loop {
            match self.poll_once(job_id).await? {
                PollVerdict::Succeeded => return Ok(()),
                PollVerdict::Failed(status) => {
                    last_status = status;
                    break;
                }
                PollVerdict::Continue(status) => last_status = status,
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(JOB_POLL_INTERVAL).await;
        }

        sink.accept(
            &format!(
                "Batch job ended with status {last_status}. \
                 Check job {job_name} on the backend for details."
            ),
            true,
        );
        Err(RunnerError::JobOutcome {
            job_name: job_name.to_owned(),
            status: last_status,
            exit_code: last_status.exit_code(),
            stdout_lines: sink.stdout_count(),
            stderr_lines: sink.stderr_count(),
        })
    }

    async fn poll_once(&self, job_id: &str) -> Result<PollVerdict, RunnerError> {
        let status = self.compute.job_status(job_id).await?;
        Ok(match status {
            JobStatus::Succeeded => PollVerdict::Succeeded,
            JobStatus::Failed => PollVerdict::Failed(status),
            transient => PollVerdict::Continue(transient),
        })
    }

    /// Locate (or create) the batch log group and start the live tail
    /// filtered to this job's stream prefix.
    async fn start_tail(&self, job_name: &str) -> Result<LiveTail, RunnerError> {
        let arn = match self
            .logs
            .resolve_log_group(LOG_GROUP_NAME, &self.config.region)
            .await?
        {
            Some(arn) => arn,
            None => {
                self.logs.create_log_group(LOG_GROUP_NAME).await?;
                self.logs
                    .resolve_log_group(LOG_GROUP_NAME, &self.config.region)
                    .await?
                    .ok_or(BackendError::MissingField("log group arn"))?
            }
        };
        Ok(self.logs.start_live_tail(&arn, job_name).await?)
    }

    /// Build the staging plan, or fail fast when files are requested
    /// without a bucket.
    fn staging_plan(&self, task: &ScriptTask) -> Result<Option<StagingPlan>, RunnerError> {
        match &self.config.bucket {
            Some(bucket) => Ok(Some(StagingPlan::new(
                bucket,
                task.files_to_upload.clone(),
                task.files_to_download.clone(),
            ))),
            None if !task.files_to_upload.is_empty() => Err(RunnerError::Configuration(
                "a bucket is required to stage input files".to_owned(),
            )),
            None if !task.files_to_download.is_empty() => Err(RunnerError::Configuration(
                "a bucket is required to retrieve output files".to_owned(),
            )),
            None => Ok(None),
        }
    }
}
