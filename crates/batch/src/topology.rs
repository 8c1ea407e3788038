//! Container execution topology for one batch job.
//!
//! Turns the configuration, the task, and the discovered compute
//! environment into an ordered set of container definitions. With
//! staging the job is a three-container chain (input staging -> main
//! -> output staging) sharing one volume; without it the job is a
//! single essential main container.

use std::collections::BTreeMap;

use crate::backend::{ComputeEnvironment, ComputeResourceKind, OrchestrationType};
use crate::config::{BatchConfig, ScriptTask};
use crate::error::RunnerError;
use crate::staging::StagingPlan;

/// Name of the container running the user script.
pub const MAIN_CONTAINER: &str = "main";
/// Name of the side container that pulls staged inputs into the volume.
pub const INPUT_CONTAINER: &str = "inputFiles";
/// Name of the side container that pushes outputs back to the bucket.
pub const OUTPUT_CONTAINER: &str = "outputFiles";

/// Shared volume mounted by every container of a staged job.
const VOLUME_NAME: &str = "strato";

/// Dependency condition used on every edge of the chain.
const CONDITION_SUCCESS: &str = "SUCCESS";

/// Fixed resource cost reserved for each staging side container.
const SIDE_CONTAINER_MEMORY_MIB: u32 = 128;
const SIDE_CONTAINER_CPU: f32 = 0.1;

/// Platform capability derived from the compute resource kind.
///
/// `Unsupported` is a valid, explicit state: the capability is simply
/// omitted from registration and the backend rejects the definition
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCapability {
    Fargate,
    Ec2,
    Unsupported,
}

/// Start-order dependency on another container of the same job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDependency {
    pub container_name: String,
    /// Always [`CONDITION_SUCCESS`]: the dependency must have
    /// succeeded before this container starts.
    pub condition: String,
}

impl ContainerDependency {
    fn on_success(container_name: &str) -> Self {
        Self {
            container_name: container_name.to_owned(),
            condition: CONDITION_SUCCESS.to_owned(),
        }
    }
}

/// One container definition within the job.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub memory_mib: u32,
    pub cpu_vcpus: f32,
    /// Path at which the shared volume is mounted, when staging is in
    /// play.
    pub mount_path: Option<String>,
    pub essential: bool,
    pub depends_on: Vec<ContainerDependency>,
    /// Log-stream prefix; set only on the main container.
    pub log_stream_prefix: Option<String>,
}

/// The full registration-ready job shape.
#[derive(Debug, Clone)]
pub struct JobTopology {
    pub platform: PlatformCapability,
    pub volume_name: String,
    /// Ordered: input staging (if any), main, output staging (if any).
    pub containers: Vec<ContainerSpec>,
    pub execution_role_arn: Option<String>,
    pub task_role_arn: Option<String>,
    /// Fargate tasks get a public address; EC2 environments do not.
    pub assign_public_ip: bool,
}

impl JobTopology {
    /// Look up a container by name.
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Map a compute resource kind to the platform capability tag.
pub fn platform_capability(kind: &ComputeResourceKind) -> PlatformCapability {
    match kind {
        ComputeResourceKind::Fargate | ComputeResourceKind::FargateSpot => {
            PlatformCapability::Fargate
        }
        ComputeResourceKind::Ec2 | ComputeResourceKind::Spot => PlatformCapability::Ec2,
        ComputeResourceKind::Other(_) => PlatformCapability::Unsupported,
    }
}

/// Build the container topology for one job.
///
/// Fails if the compute environment is not ECS-orchestrated, or if a
/// staged job's resource request is too small to cover the side
/// containers. When a staging plan is present the result is the chain
/// inputFiles -> main -> outputFiles with the side-container resource
/// reservation subtracted from the main container's share.
pub fn build(
    config: &BatchConfig,
    task: &ScriptTask,
    staging: Option<&StagingPlan>,
    environment: &ComputeEnvironment,
    job_name: &str,
) -> Result<JobTopology, RunnerError> {
    if environment.orchestration != OrchestrationType::Ecs {
        return Err(RunnerError::Configuration(format!(
            "only ECS compute environments are supported, {} is {:?}",
            environment.arn, environment.orchestration
        )));
    }

    let platform = platform_capability(&environment.resource_kind);
    let side_count = if staging.is_some() { 2 } else { 0 };

    // The side-container reservation comes out of the main share; a
    // request too small to cover it would underflow.
    let request = config.resources.request;
    if side_count > 0
        && (request.memory <= side_count * SIDE_CONTAINER_MEMORY_MIB
            || request.cpu <= side_count as f32 * SIDE_CONTAINER_CPU)
    {
        return Err(RunnerError::Configuration(format!(
            "resource request {} MiB / {} vCPU cannot cover the {} MiB / {} vCPU \
             reserved for the file staging containers",
            request.memory,
            request.cpu,
            side_count * SIDE_CONTAINER_MEMORY_MIB,
            side_count as f32 * SIDE_CONTAINER_CPU,
        )));
    }

    let mut containers = Vec::with_capacity(1 + side_count as usize);
    if let Some(plan) = staging {
        containers.push(input_container(config, plan));
    }
    containers.push(main_container(config, task, staging, job_name, side_count));
    if let Some(plan) = staging {
        containers.push(output_container(config, plan));
    }

    Ok(JobTopology {
        platform,
        volume_name: VOLUME_NAME.to_owned(),
        containers,
        execution_role_arn: config.execution_role_arn.clone(),
        task_role_arn: config.task_role_arn.clone(),
        assign_public_ip: platform == PlatformCapability::Fargate,
    })
}

/// Pulls every uploaded object into the shared volume and creates the
/// output directory, before the main container starts.
fn input_container(config: &BatchConfig, plan: &StagingPlan) -> ContainerSpec {
    let mut commands: Vec<String> = plan
        .files_to_upload
        .iter()
        .map(|relative| {
            let remote = plan.remote_path(relative);
            format!("aws s3 cp {}{remote} {remote}", bucket_root(plan))
        })
        .collect();
    commands.push(format!("mkdir {}", plan.output_dir));

    side_container(config, plan, INPUT_CONTAINER, commands, Vec::new())
}

/// Pushes each requested output file and the whole output directory
/// back to the bucket, after the main container succeeds.
fn output_container(config: &BatchConfig, plan: &StagingPlan) -> ContainerSpec {
    let mut commands: Vec<String> = plan
        .files_to_download
        .iter()
        .map(|relative| {
            let remote = plan.remote_path(relative);
            format!("aws s3 cp {remote} {}{remote}", bucket_root(plan))
        })
        .collect();
    commands.push(format!(
        "aws s3 cp {output}/ {root}{output}/ --recursive",
        output = plan.output_dir,
        root = bucket_root(plan),
    ));

    side_container(
        config,
        plan,
        OUTPUT_CONTAINER,
        commands,
        vec![ContainerDependency::on_success(MAIN_CONTAINER)],
    )
}

fn side_container(
    config: &BatchConfig,
    plan: &StagingPlan,
    name: &str,
    commands: Vec<String>,
    depends_on: Vec<ContainerDependency>,
) -> ContainerSpec {
    ContainerSpec {
        name: name.to_owned(),
        image: config.staging_image.clone(),
        command: shell_command(commands),
        environment: BTreeMap::new(),
        memory_mib: SIDE_CONTAINER_MEMORY_MIB,
        cpu_vcpus: SIDE_CONTAINER_CPU,
        mount_path: Some(plan.working_dir.clone()),
        essential: false,
        depends_on,
        log_stream_prefix: None,
    }
}

fn main_container(
    config: &BatchConfig,
    task: &ScriptTask,
    staging: Option<&StagingPlan>,
    job_name: &str,
    side_count: u32,
) -> ContainerSpec {
    let request = config.resources.request;
    ContainerSpec {
        name: MAIN_CONTAINER.to_owned(),
        image: task.image.clone(),
        command: task.command.clone(),
        environment: task.env.clone(),
        memory_mib: request.memory - side_count * SIDE_CONTAINER_MEMORY_MIB,
        cpu_vcpus: request.cpu - side_count as f32 * SIDE_CONTAINER_CPU,
        mount_path: staging.map(|plan| plan.working_dir.clone()),
        essential: staging.is_none(),
        depends_on: staging
            .map(|_| vec![ContainerDependency::on_success(INPUT_CONTAINER)])
            .unwrap_or_default(),
        log_stream_prefix: Some(job_name.to_owned()),
    }
}

/// `s3://bucket` without the working-directory suffix, so remote
/// absolute paths can be appended verbatim.
fn bucket_root(plan: &StagingPlan) -> String {
    format!("s3://{}", plan.bucket)
}

/// Wrap a command list for `/bin/sh -c` execution, one per line.
fn shell_command(commands: Vec<String>) -> Vec<String> {
    vec!["/bin/sh".to_owned(), "-c".to_owned(), commands.join("\n")]
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config(bucket: Option<&str>) -> BatchConfig {
        serde_json::from_value(serde_json::json!({
            "region": "eu-west-1",
            "computeEnvironmentArn": "arn:ce",
            "bucket": bucket,
        }))
        .expect("test config should deserialize")
    }

    fn task() -> ScriptTask {
        ScriptTask {
            name: "demo".to_owned(),
            image: "ubuntu:latest".to_owned(),
            command: vec!["echo".to_owned(), "hi".to_owned()],
            env: BTreeMap::new(),
            working_directory: PathBuf::from("/tmp/demo"),
            output_directory: PathBuf::from("/tmp/demo/out"),
            files_to_upload: vec![],
            files_to_download: vec![],
        }
    }

    fn fargate_env() -> ComputeEnvironment {
        ComputeEnvironment {
            arn: "arn:ce".to_owned(),
            orchestration: OrchestrationType::Ecs,
            resource_kind: ComputeResourceKind::Fargate,
        }
    }

    #[test]
    fn without_staging_topology_is_single_essential_main() {
        let topology = build(&config(None), &task(), None, &fargate_env(), "job-1")
            .expect("build should succeed");

        assert_eq!(topology.containers.len(), 1);
        let main = topology.container(MAIN_CONTAINER).expect("main present");
        assert!(main.essential);
        assert!(main.depends_on.is_empty());
        assert!(main.mount_path.is_none());
        assert_eq!(main.memory_mib, 2048);
        assert!((main.cpu_vcpus - 1.0).abs() < 1e-6);
        assert_eq!(main.log_stream_prefix.as_deref(), Some("job-1"));
    }

    #[test]
    fn with_staging_topology_is_three_container_chain() {
        let plan = StagingPlan::new("bucket", vec!["in.txt".into()], vec!["out.txt".into()]);
        let topology = build(
            &config(Some("bucket")),
            &task(),
            Some(&plan),
            &fargate_env(),
            "job-1",
        )
        .expect("build should succeed");

        assert_eq!(topology.containers.len(), 3);
        assert_eq!(topology.containers[0].name, INPUT_CONTAINER);
        assert_eq!(topology.containers[1].name, MAIN_CONTAINER);
        assert_eq!(topology.containers[2].name, OUTPUT_CONTAINER);

        let main = topology.container(MAIN_CONTAINER).expect("main present");
        assert!(!main.essential);
        assert_eq!(main.depends_on.len(), 1);
        assert_eq!(main.depends_on[0].container_name, INPUT_CONTAINER);
        assert_eq!(main.depends_on[0].condition, CONDITION_SUCCESS);

        let output = topology.container(OUTPUT_CONTAINER).expect("output present");
        assert_eq!(output.depends_on.len(), 1);
        assert_eq!(output.depends_on[0].container_name, MAIN_CONTAINER);
        assert_eq!(output.depends_on[0].condition, CONDITION_SUCCESS);

        for container in &topology.containers {
            assert_eq!(container.mount_path.as_deref(), Some(plan.working_dir.as_str()));
        }
    }

    #[test]
    fn resource_split_reserves_side_container_share() {
        let plan = StagingPlan::new("bucket", vec![], vec![]);
        let topology = build(
            &config(Some("bucket")),
            &task(),
            Some(&plan),
            &fargate_env(),
            "job-1",
        )
        .expect("build should succeed");

        let main = topology.container(MAIN_CONTAINER).expect("main present");
        assert_eq!(main.memory_mib, 1792);
        assert!((main.cpu_vcpus - 0.8).abs() < 1e-6);

        for side in [INPUT_CONTAINER, OUTPUT_CONTAINER] {
            let side = topology.container(side).expect("side present");
            assert_eq!(side.memory_mib, 128);
            assert!((side.cpu_vcpus - 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn staged_request_below_side_reservation_is_rejected() {
        let plan = StagingPlan::new("bucket", vec![], vec![]);
        let mut config = config(Some("bucket"));
        config.resources.request.memory = 100;

        let err = build(&config, &task(), Some(&plan), &fargate_env(), "job-1")
            .expect_err("a request below the side-container share must be rejected");
        assert!(matches!(err, RunnerError::Configuration(_)));

        // The same request without staging needs no reservation.
        build(&config, &task(), None, &fargate_env(), "job-1")
            .expect("unstaged build should succeed");
    }

    #[test]
    fn input_container_pulls_files_and_creates_output_dir() {
        let plan = StagingPlan::new("bucket", vec!["data/in.csv".into()], vec![]);
        let topology = build(
            &config(Some("bucket")),
            &task(),
            Some(&plan),
            &fargate_env(),
            "job-1",
        )
        .expect("build should succeed");

        let input = topology.container(INPUT_CONTAINER).expect("input present");
        assert_eq!(input.command[0], "/bin/sh");
        assert_eq!(input.command[1], "-c");
        let script = &input.command[2];
        assert!(script.contains(&format!(
            "aws s3 cp s3://bucket{dir}/data/in.csv {dir}/data/in.csv",
            dir = plan.working_dir
        )));
        assert!(script.contains(&format!("mkdir {}", plan.output_dir)));
    }

    #[test]
    fn output_container_pushes_files_and_output_dir() {
        let plan = StagingPlan::new("bucket", vec![], vec!["result.bin".into()]);
        let topology = build(
            &config(Some("bucket")),
            &task(),
            Some(&plan),
            &fargate_env(),
            "job-1",
        )
        .expect("build should succeed");

        let output = topology.container(OUTPUT_CONTAINER).expect("output present");
        let script = &output.command[2];
        assert!(script.contains(&format!(
            "aws s3 cp {dir}/result.bin s3://bucket{dir}/result.bin",
            dir = plan.working_dir
        )));
        assert!(script.contains(&format!(
            "aws s3 cp {out}/ s3://bucket{out}/ --recursive",
            out = plan.output_dir
        )));
    }

    #[test]
    fn fargate_gets_public_ip_and_ec2_does_not() {
        let topology = build(&config(None), &task(), None, &fargate_env(), "job-1")
            .expect("build should succeed");
        assert_eq!(topology.platform, PlatformCapability::Fargate);
        assert!(topology.assign_public_ip);

        let ec2 = ComputeEnvironment {
            resource_kind: ComputeResourceKind::Spot,
            ..fargate_env()
        };
        let topology =
            build(&config(None), &task(), None, &ec2, "job-1").expect("build should succeed");
        assert_eq!(topology.platform, PlatformCapability::Ec2);
        assert!(!topology.assign_public_ip);
    }

    #[test]
    fn unknown_resource_kind_is_explicitly_unsupported() {
        let kind = ComputeResourceKind::Other("QUANTUM".to_owned());
        assert_eq!(platform_capability(&kind), PlatformCapability::Unsupported);
    }

    #[test]
    fn non_ecs_orchestration_is_rejected() {
        let eks = ComputeEnvironment {
            orchestration: OrchestrationType::Eks,
            ..fargate_env()
        };
        let err = build(&config(None), &task(), None, &eks, "job-1")
            .expect_err("EKS environments must be rejected");
        assert!(matches!(err, RunnerError::Configuration(_)));
    }
}
