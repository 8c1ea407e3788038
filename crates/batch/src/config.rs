//! Orchestrator configuration and the per-run task description.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Default staging helper image. Must carry the `aws` CLI and a POSIX
/// shell entrypoint so the side containers can copy files around.
const DEFAULT_STAGING_IMAGE: &str = "ghcr.io/kestra-io/awsbatch:latest";

fn default_wait_until_completion() -> Duration {
    Duration::from_secs(3600)
}

fn default_staging_image() -> String {
    DEFAULT_STAGING_IMAGE.to_owned()
}

/// Immutable configuration for the batch runner.
///
/// `bucket` is required only when file staging is requested; the
/// runner validates that before any remote resource is created.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    /// Backend region identifier, e.g. `eu-west-1`.
    pub region: String,

    /// Compute environment to run jobs on. Must resolve to an
    /// ECS-orchestrated environment (Fargate or EC2 backed).
    pub compute_environment_arn: String,

    /// Pre-existing job queue. When absent, a single-use queue is
    /// created per run and torn down afterwards.
    #[serde(default)]
    pub job_queue_arn: Option<String>,

    /// Bucket used to stage input files before the run and collect
    /// output files after it.
    #[serde(default)]
    pub bucket: Option<String>,

    /// Execution role for the job. Required by the backend for
    /// Fargate compute environments.
    #[serde(default)]
    pub execution_role_arn: Option<String>,

    /// Task role available inside the containers.
    #[serde(default)]
    pub task_role_arn: Option<String>,

    /// Container resource request, split between the main container
    /// and any staging side containers.
    #[serde(default)]
    pub resources: Resources,

    /// Maximum duration to wait for job completion. Also submitted to
    /// the backend as the job's own timeout.
    #[serde(default = "default_wait_until_completion")]
    pub wait_until_completion: Duration,

    /// Image used by the staging side containers.
    #[serde(default = "default_staging_image")]
    pub staging_image: String,

    /// Static credential pair. When both parts are present they are
    /// used verbatim; otherwise the ambient default chain applies.
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_key_id: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,

    /// Alternative API endpoint, mainly for local test stacks.
    #[serde(default)]
    pub endpoint_override: Option<String>,
}

/// Container resource requests.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub request: ResourceRequest,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            request: ResourceRequest::default(),
        }
    }
}

/// One resource request: whole MiB of memory and a vCPU fraction.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResourceRequest {
    #[serde(default = "ResourceRequest::default_memory")]
    pub memory: u32,
    #[serde(default = "ResourceRequest::default_cpu")]
    pub cpu: f32,
}

impl ResourceRequest {
    fn default_memory() -> u32 {
        2048
    }

    fn default_cpu() -> f32 {
        1.0
    }
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            memory: Self::default_memory(),
            cpu: Self::default_cpu(),
        }
    }
}

/// One script execution request: what to run and which files move
/// with it.
///
/// `files_to_upload` and `files_to_download` are paths relative to
/// `working_directory`; requesting either without a configured bucket
/// fails the run before submission.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    /// Caller-side task name; the job name (and log-stream prefix) is
    /// derived from it plus a fresh identifier.
    pub name: String,
    /// Image running the user script.
    pub image: String,
    /// Fully rendered command for the main container.
    pub command: Vec<String>,
    /// Environment for the main container. Keys are unique by type.
    pub env: BTreeMap<String, String>,
    /// Local directory uploads are read from and file downloads are
    /// written back to.
    pub working_directory: PathBuf,
    /// Local directory the remote output directory is mirrored into
    /// after a successful run.
    pub output_directory: PathBuf,
    pub files_to_upload: Vec<String>,
    pub files_to_download: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let resources = Resources::default();
        assert_eq!(resources.request.memory, 2048);
        assert_eq!(resources.request.cpu, 1.0);
        assert_eq!(default_wait_until_completion(), Duration::from_secs(3600));
    }

    #[test]
    fn deserializes_minimal_config_with_defaults() {
        let config: BatchConfig = serde_json::from_value(serde_json::json!({
            "region": "eu-west-1",
            "computeEnvironmentArn": "arn:aws:batch:eu-west-1:123:compute-environment/ce",
        }))
        .expect("minimal config should deserialize");

        assert_eq!(config.region, "eu-west-1");
        assert!(config.job_queue_arn.is_none());
        assert!(config.bucket.is_none());
        assert_eq!(config.resources.request.memory, 2048);
        assert_eq!(config.wait_until_completion, Duration::from_secs(3600));
    }

    #[test]
    fn deserializes_explicit_resources() {
        let config: BatchConfig = serde_json::from_value(serde_json::json!({
            "region": "us-east-1",
            "computeEnvironmentArn": "arn",
            "jobQueueArn": "queue-arn",
            "bucket": "my-bucket",
            "resources": { "request": { "memory": 4096, "cpu": 2.0 } },
        }))
        .expect("config should deserialize");

        assert_eq!(config.resources.request.memory, 4096);
        assert_eq!(config.resources.request.cpu, 2.0);
        assert_eq!(config.job_queue_arn.as_deref(), Some("queue-arn"));
        assert_eq!(config.bucket.as_deref(), Some("my-bucket"));
    }
}
