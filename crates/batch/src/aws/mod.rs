//! AWS implementations of the backend seams.
//!
//! One module per service client: Batch for the compute backend,
//! CloudWatch Logs for the live tail, S3 for the blob store, plus the
//! shared connection/credential resolution.

mod batch;
mod connection;
mod logs;
mod s3;

pub use batch::AwsComputeBackend;
pub use connection::Connection;
pub use logs::AwsLogBackend;
pub use s3::AwsBlobStore;

use crate::error::BackendError;

/// Map a request-assembly failure to the seam error type.
fn build_err(e: aws_smithy_types::error::operation::BuildError) -> BackendError {
    BackendError::InvalidRequest(e.to_string())
}
