//! Remote script execution on AWS Batch.
//!
//! The runner registers a multi-container ECS job definition around a
//! user script, optionally stages files through S3, submits the job to
//! a queue (creating a single-use one when none is configured), tails
//! CloudWatch logs while the job runs, and tears everything down when
//! it finishes.
//!
//! All cloud interaction goes through the seams in [`backend`], so the
//! orchestration in [`runner`] is testable against in-memory fakes.

pub mod aws;
pub mod backend;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod runner;
pub mod staging;
pub mod status;
pub mod tail;
pub mod topology;

pub use config::{BatchConfig, ScriptTask};
pub use error::RunnerError;
pub use runner::{BatchRunner, RunOutcome};
pub use status::JobStatus;
