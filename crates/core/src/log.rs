//! Log-sink seam between the orchestrator and its caller.
//!
//! Remote job output (live-tailed container logs, terminal status
//! lines) is pushed into a [`LogSink`]. The orchestrator wraps the
//! caller's sink in a [`CountingSink`] so that failure reports can
//! carry how many stdout/stderr lines were captured.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives log lines surfaced from a remote job.
///
/// `is_stderr` distinguishes ordinary output from error-channel lines
/// (stream failures, terminal status messages).
pub trait LogSink: Send + Sync {
    fn accept(&self, line: &str, is_stderr: bool);
}

/// Default sink: forwards lines to `tracing`.
pub struct TracingSink;

impl LogSink for TracingSink {
    fn accept(&self, line: &str, is_stderr: bool) {
        if is_stderr {
            tracing::warn!("{line}");
        } else {
            tracing::info!("{line}");
        }
    }
}

/// Wraps another sink and counts the lines flowing through it.
///
/// Cheap to clone via `Arc`; the counters are shared.
pub struct CountingSink {
    inner: Arc<dyn LogSink>,
    stdout_lines: AtomicU64,
    stderr_lines: AtomicU64,
}

impl CountingSink {
    pub fn new(inner: Arc<dyn LogSink>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            stdout_lines: AtomicU64::new(0),
            stderr_lines: AtomicU64::new(0),
        })
    }

    /// Number of non-error lines accepted so far.
    pub fn stdout_count(&self) -> u64 {
        self.stdout_lines.load(Ordering::Relaxed)
    }

    /// Number of error-channel lines accepted so far.
    pub fn stderr_count(&self) -> u64 {
        self.stderr_lines.load(Ordering::Relaxed)
    }
}

impl LogSink for CountingSink {
    fn accept(&self, line: &str, is_stderr: bool) {
        if is_stderr {
            self.stderr_lines.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stdout_lines.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.accept(line, is_stderr);
    }
}

/// Test sink that records every accepted line in memory.
pub struct CollectingSink {
    lines: std::sync::Mutex<Vec<(String, bool)>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            lines: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Snapshot of all `(line, is_stderr)` pairs accepted so far.
    pub fn lines(&self) -> Vec<(String, bool)> {
        self.lines.lock().expect("sink lock poisoned").clone()
    }
}

impl LogSink for CollectingSink {
    fn accept(&self, line: &str, is_stderr: bool) {
        self.lines
            .lock()
            .expect("sink lock poisoned")
            .push((line.to_owned(), is_stderr));
    }
}
