//! Shared leaf types for the strato job orchestrator.
//!
//! Holds the pieces that every other crate needs but that carry no AWS
//! dependency: unique identifier generation and the log-sink seam
//! through which remote job output reaches the caller.

pub mod ids;
pub mod log;
