//! AWS Batch implementation of the compute backend seam.

use async_trait::async_trait;
use aws_sdk_batch::types as bt;

use crate::backend::{
    ComputeBackend, ComputeEnvironment, ComputeResourceKind, JobQueueStatus, JobSubmission,
    OrchestrationType,
};
use crate::error::BackendError;
use crate::status::JobStatus;
use crate::topology::{ContainerSpec, JobTopology, PlatformCapability};

/// Compute backend talking to AWS Batch.
pub struct AwsComputeBackend {
    client: aws_sdk_batch::Client,
}

impl AwsComputeBackend {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_batch::Client::new(sdk_config),
        }
    }
}

fn batch_err(e: impl Into<aws_sdk_batch::Error>) -> BackendError {
    BackendError::Api(e.into().to_string())
}

#[async_trait]
impl ComputeBackend for AwsComputeBackend {
    async fn describe_compute_environment(
        &self,
        arn: &str,
    ) -> Result<Option<ComputeEnvironment>, BackendError> {
        let output = self
            .client
            .describe_compute_environments()
            .compute_environments(arn)
            .send()
            .await
            .map_err(batch_err)?;

        let Some(detail) = output.compute_environments().first() else {
            return Ok(None);
        };

        Ok(Some(ComputeEnvironment {
            arn: detail
                .compute_environment_arn()
                .unwrap_or(arn)
                .to_owned(),
            orchestration: orchestration_of(detail),
            resource_kind: resource_kind_of(detail),
        }))
    }

    async fn register_job_definition(
        &self,
        name: &str,
        topology: &JobTopology,
    ) -> Result<String, BackendError> {
        let mut task = bt::EcsTaskProperties::builder()
            .volumes(bt::Volume::builder().name(&topology.volume_name).build());

        if topology.assign_public_ip {
            task = task.network_configuration(
                bt::NetworkConfiguration::builder()
                    .assign_public_ip(bt::AssignPublicIp::Enabled)
                    .build(),
            );
        }
        if let Some(role) = &topology.execution_role_arn {
            task = task.execution_role_arn(role);
        }
        if let Some(role) = &topology.task_role_arn {
            task = task.task_role_arn(role);
        }
        for container in &topology.containers {
            task = task.containers(task_container(container, &topology.volume_name));
        }

        let ecs_properties = bt::EcsProperties::builder()
            .task_properties(task.build())
            .build();

        let mut request = self
            .client
            .register_job_definition()
            .job_definition_name(name)
            .r#type(bt::JobDefinitionType::Container)
            .ecs_properties(ecs_properties);

        // Unsupported platforms register without a capability and let
        // the backend reject the definition.
        request = match topology.platform {
            PlatformCapability::Fargate => {
                request.platform_capabilities(bt::PlatformCapability::Fargate)
            }
            PlatformCapability::Ec2 => {
                request.platform_capabilities(bt::PlatformCapability::Ec2)
            }
            PlatformCapability::Unsupported => request,
        };

        let output = request.send().await.map_err(batch_err)?;
        output
            .job_definition_arn()
            .map(str::to_owned)
            .ok_or(BackendError::MissingField("job definition arn"))
    }

    async fn deregister_job_definition(&self, arn: &str) -> Result<(), BackendError> {
        self.client
            .deregister_job_definition()
            .job_definition(arn)
            .send()
            .await
            .map_err(batch_err)?;
        Ok(())
    }

    async fn create_job_queue(
        &self,
        name: &str,
        compute_environment_arn: &str,
        priority: i32,
    ) -> Result<String, BackendError> {
        let order = bt::ComputeEnvironmentOrder::builder()
            .order(1)
            .compute_environment(compute_environment_arn)
            .build();

        let output = self
            .client
            .create_job_queue()
            .job_queue_name(name)
            .priority(priority)
            .compute_environment_order(order)
            .send()
            .await
            .map_err(batch_err)?;

        output
            .job_queue_arn()
            .map(str::to_owned)
            .ok_or(BackendError::MissingField("job queue arn"))
    }

    async fn job_queue_status(&self, arn: &str) -> Result<JobQueueStatus, BackendError> {
        let output = self
            .client
            .describe_job_queues()
            .job_queues(arn)
            .send()
            .await
            .map_err(batch_err)?;

        let detail = output
            .job_queues()
            .first()
            .ok_or(BackendError::MissingField("job queue detail"))?;

        Ok(match detail.status() {
            Some(bt::JqStatus::Creating) => JobQueueStatus::Creating,
            Some(bt::JqStatus::Updating) => JobQueueStatus::Updating,
            Some(bt::JqStatus::Valid) => JobQueueStatus::Valid,
            Some(bt::JqStatus::Invalid) => JobQueueStatus::Invalid,
            Some(bt::JqStatus::Deleting) => JobQueueStatus::Deleting,
            Some(bt::JqStatus::Deleted) => JobQueueStatus::Deleted,
            _ => JobQueueStatus::Unknown,
        })
    }

    async fn disable_job_queue(&self, arn: &str) -> Result<(), BackendError> {
        self.client
            .update_job_queue()
            .job_queue(arn)
            .state(bt::JqState::Disabled)
            .send()
            .await
            .map_err(batch_err)?;
        Ok(())
    }

    async fn delete_job_queue(&self, arn: &str) -> Result<(), BackendError> {
        self.client
            .delete_job_queue()
            .job_queue(arn)
            .send()
            .await
            .map_err(batch_err)?;
        Ok(())
    }

    async fn submit_job(&self, submission: &JobSubmission) -> Result<String, BackendError> {
        let output = self
            .client
            .submit_job()
            .job_name(&submission.job_name)
            .job_queue(&submission.job_queue_arn)
            .job_definition(&submission.job_definition_arn)
            .timeout(
                bt::JobTimeout::builder()
                    .attempt_duration_seconds(submission.timeout_seconds as i32)
                    .build(),
            )
            .send()
            .await
            .map_err(batch_err)?;

        output
            .job_id()
            .map(str::to_owned)
            .ok_or(BackendError::MissingField("job id"))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, BackendError> {
        let output = self
            .client
            .describe_jobs()
            .jobs(job_id)
            .send()
            .await
            .map_err(batch_err)?;

        let detail = output
            .jobs()
            .first()
            .ok_or(BackendError::MissingField("job detail"))?;

        Ok(match detail.status() {
            Some(bt::JobStatus::Submitted) => JobStatus::Submitted,
            Some(bt::JobStatus::Pending) => JobStatus::Pending,
            Some(bt::JobStatus::Runnable) => JobStatus::Runnable,
            Some(bt::JobStatus::Starting) => JobStatus::Starting,
            Some(bt::JobStatus::Running) => JobStatus::Running,
            Some(bt::JobStatus::Succeeded) => JobStatus::Succeeded,
            Some(bt::JobStatus::Failed) => JobStatus::Failed,
            _ => JobStatus::Unknown,
        })
    }
}

fn orchestration_of(detail: &bt::ComputeEnvironmentDetail) -> OrchestrationType {
    match detail.container_orchestration_type() {
        Some(bt::OrchestrationType::Ecs) => OrchestrationType::Ecs,
        Some(bt::OrchestrationType::Eks) => OrchestrationType::Eks,
        Some(other) => OrchestrationType::Other(other.as_str().to_owned()),
        None => OrchestrationType::Other("unspecified".to_owned()),
    }
}

fn resource_kind_of(detail: &bt::ComputeEnvironmentDetail) -> ComputeResourceKind {
    match detail.compute_resources().and_then(|r| r.r#type()) {
        Some(bt::CrType::Fargate) => ComputeResourceKind::Fargate,
        Some(bt::CrType::FargateSpot) => ComputeResourceKind::FargateSpot,
        Some(bt::CrType::Ec2) => ComputeResourceKind::Ec2,
        Some(bt::CrType::Spot) => ComputeResourceKind::Spot,
        Some(other) => ComputeResourceKind::Other(other.as_str().to_owned()),
        None => ComputeResourceKind::Other("unspecified".to_owned()),
    }
}

fn task_container(spec: &ContainerSpec, volume_name: &str) -> bt::TaskContainerProperties {
    let mut builder = bt::TaskContainerProperties::builder()
        .name(&spec.name)
        .image(&spec.image)
        .essential(spec.essential)
        .set_command(Some(spec.command.clone()))
        .resource_requirements(
            bt::ResourceRequirement::builder()
                .r#type(bt::ResourceType::Memory)
                .value(spec.memory_mib.to_string())
                .build(),
        )
        .resource_requirements(
            bt::ResourceRequirement::builder()
                .r#type(bt::ResourceType::Vcpu)
                .value(spec.cpu_vcpus.to_string())
                .build(),
        );

    for (name, value) in &spec.environment {
        builder = builder.environment(bt::KeyValuePair::builder().name(name).value(value).build());
    }
    if let Some(path) = &spec.mount_path {
        builder = builder.mount_points(
            bt::MountPoint::builder()
                .container_path(path)
                .source_volume(volume_name)
                .build(),
        );
    }
    for dependency in &spec.depends_on {
        builder = builder.depends_on(
            bt::TaskContainerDependency::builder()
                .container_name(&dependency.container_name)
                .condition(&dependency.condition)
                .build(),
        );
    }
    if let Some(prefix) = &spec.log_stream_prefix {
        builder = builder.log_configuration(
            bt::LogConfiguration::builder()
                .log_driver(bt::LogDriver::Awslogs)
                .options("awslogs-stream-prefix", prefix)
                .build(),
        );
    }

    builder.build()
}
