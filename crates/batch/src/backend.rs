//! Collaborator seams to the compute, log, and blob backends.
//!
//! The orchestrator only ever talks to these traits. Production code
//! wires in the AWS implementations from [`crate::aws`]; tests drive
//! the lifecycle with in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;
use crate::status::JobStatus;
use crate::topology::JobTopology;

/// Container orchestration family of a compute environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationType {
    Ecs,
    Eks,
    Other(String),
}

/// Compute resource flavour backing a compute environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeResourceKind {
    Fargate,
    FargateSpot,
    Ec2,
    Spot,
    Other(String),
}

/// Resolved detail of a compute environment.
#[derive(Debug, Clone)]
pub struct ComputeEnvironment {
    pub arn: String,
    pub orchestration: OrchestrationType,
    pub resource_kind: ComputeResourceKind,
}

/// Status of a job queue, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobQueueStatus {
    Creating,
    Updating,
    Valid,
    Invalid,
    Deleting,
    Deleted,
    Unknown,
}

/// Everything needed to submit one job.
#[derive(Debug, Clone)]
pub struct JobSubmission {
    /// Job name, which doubles as the log-stream prefix.
    pub job_name: String,
    pub job_queue_arn: String,
    pub job_definition_arn: String,
    /// Whole seconds of the configured completion timeout; the backend
    /// kills the job itself once this elapses.
    pub timeout_seconds: i64,
}

/// Compute backend: job definitions, queues, and job execution.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Resolve a compute environment ARN, or `None` if it does not
    /// exist.
    async fn describe_compute_environment(
        &self,
        arn: &str,
    ) -> Result<Option<ComputeEnvironment>, BackendError>;

    /// Register a job definition for the topology under `name`;
    /// returns its ARN. Not idempotent: callers generate a fresh name
    /// per attempt.
    async fn register_job_definition(
        &self,
        name: &str,
        topology: &JobTopology,
    ) -> Result<String, BackendError>;

    async fn deregister_job_definition(&self, arn: &str) -> Result<(), BackendError>;

    /// Create a queue bound (order 1) to the compute environment;
    /// returns its ARN. The queue is not usable until its status
    /// reaches [`JobQueueStatus::Valid`].
    async fn create_job_queue(
        &self,
        name: &str,
        compute_environment_arn: &str,
        priority: i32,
    ) -> Result<String, BackendError>;

    async fn job_queue_status(&self, arn: &str) -> Result<JobQueueStatus, BackendError>;

    async fn disable_job_queue(&self, arn: &str) -> Result<(), BackendError>;

    async fn delete_job_queue(&self, arn: &str) -> Result<(), BackendError>;

    /// Submit the job; returns the backend job identifier.
    async fn submit_job(&self, submission: &JobSubmission) -> Result<String, BackendError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, BackendError>;
}

/// One push from the live log tail.
#[derive(Debug, Clone)]
pub enum TailEvent {
    /// The tail session was acknowledged. Carries no records.
    SessionStart,
    /// Zero or more raw log record payloads.
    Update(Vec<String>),
    /// A stream-level error. Terminal for the tail, not for the job:
    /// job failure is determined purely by the polled status.
    Error(String),
}

/// Handle to a running live tail.
///
/// The receiving half is handed to the consumer task; the token stays
/// with the orchestrator and is cancelled only after cleanup so
/// trailing output is not truncated.
pub struct LiveTail {
    pub events: mpsc::UnboundedReceiver<TailEvent>,
    pub cancel: CancellationToken,
}

/// Log backend: log-group discovery and live tailing.
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Find the ARN of the log group named `name` in `region`, if
    /// present.
    async fn resolve_log_group(
        &self,
        name: &str,
        region: &str,
    ) -> Result<Option<String>, BackendError>;

    async fn create_log_group(&self, name: &str) -> Result<(), BackendError>;

    /// Start a server-pushed tail of the log group, filtered to
    /// streams whose name starts with `stream_prefix`.
    async fn start_live_tail(
        &self,
        log_group_arn: &str,
        stream_prefix: &str,
    ) -> Result<LiveTail, BackendError>;
}

/// Blob store: staged file movement and prefix cleanup.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `source` to `bucket`/`key`.
    async fn put_object(&self, bucket: &str, key: &str, source: &Path)
        -> Result<(), BackendError>;

    /// Download `bucket`/`key` to `dest`, creating parent directories
    /// as needed.
    async fn get_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), BackendError>;

    /// List every key under `prefix`, following pagination.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Delete the given keys in a single call. Callers chunk to the
    /// backend's batch-delete limit.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BackendError>;
}
