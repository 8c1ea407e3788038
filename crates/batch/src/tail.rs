//! Live log tail consumption.
//!
//! A dedicated task drains the [`TailEvent`] channel for the whole
//! duration of the run, reshapes raw multi-line records, and forwards
//! each line to the caller's sink. Lines opening with the structured
//! output marker pass through unprefixed so the caller can parse them;
//! everything else gets the `[JOB LOG] ` prefix.

use std::sync::Arc;

use strato_core::log::{CountingSink, LogSink};
use tokio::sync::mpsc;

use crate::backend::TailEvent;

/// Prefix applied to ordinary remote log lines.
pub const JOB_LOG_PREFIX: &str = "[JOB LOG] ";

/// Opens a structured-output line emitted by the script runner inside
/// the container.
const OUTPUT_MARKER: &str = "::{";

/// Reshape one raw log record into printable lines.
///
/// A line break is inserted before every marker occurrence that is not
/// already at the start of the record, carriage returns become line
/// breaks, and the result is split into lines.
pub fn reshape_message(raw: &str) -> Vec<String> {
    let mut text = raw.replace(OUTPUT_MARKER, "\n::{");
    if raw.starts_with(OUTPUT_MARKER) {
        // The record already began with the marker; drop the break
        // that was just inserted in front of it.
        text.remove(0);
    }
    let text = text.replace('\r', "\n");
    text.lines().map(str::to_owned).collect()
}

/// Consume tail events until the channel closes.
///
/// Stream-level errors are forwarded as a single terminal stderr line;
/// they never fail the job by themselves (the polled status does).
/// Session-start events carry no records and are ignored.
pub async fn consume(mut events: mpsc::UnboundedReceiver<TailEvent>, sink: Arc<CountingSink>) {
    while let Some(event) = events.recv().await {
        match event {
            TailEvent::SessionStart => {}
            TailEvent::Update(records) => {
                for record in &records {
                    for line in reshape_message(record) {
                        forward_line(sink.as_ref(), &line);
                    }
                }
            }
            TailEvent::Error(message) => {
                tracing::warn!(error = %message, "Live tail stream error");
                sink.accept(&message, true);
            }
        }
    }
}

fn forward_line(sink: &CountingSink, line: &str) {
    if line.starts_with(OUTPUT_MARKER) {
        sink.accept(line, false);
    } else {
        sink.accept(&format!("{JOB_LOG_PREFIX}{line}"), false);
    }
}

#[cfg(test)]
mod tests {
    use strato_core::log::CollectingSink;

    use super::*;

    #[test]
    fn reshape_splits_on_newlines() {
        assert_eq!(reshape_message("a\nb"), vec!["a", "b"]);
    }

    #[test]
    fn reshape_converts_carriage_returns() {
        assert_eq!(reshape_message("a\rb"), vec!["a", "b"]);
    }

    #[test]
    fn reshape_breaks_before_embedded_marker() {
        assert_eq!(
            reshape_message(r#"done::{"key":"value"}"#),
            vec!["done", r#"::{"key":"value"}"#]
        );
    }

    #[test]
    fn reshape_keeps_leading_marker_intact() {
        assert_eq!(
            reshape_message(r#"::{"key":"value"}"#),
            vec![r#"::{"key":"value"}"#]
        );
    }

    #[tokio::test]
    async fn consume_prefixes_plain_lines_and_passes_markers_through() {
        let collector = CollectingSink::new();
        let sink = CountingSink::new(collector.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(TailEvent::SessionStart).unwrap();
        tx.send(TailEvent::Update(vec![
            "hello\nworld".to_owned(),
            r#"::{"out":1}"#.to_owned(),
        ]))
        .unwrap();
        drop(tx);

        consume(rx, sink.clone()).await;

        let lines = collector.lines();
        assert_eq!(
            lines,
            vec![
                (format!("{JOB_LOG_PREFIX}hello"), false),
                (format!("{JOB_LOG_PREFIX}world"), false),
                (r#"::{"out":1}"#.to_owned(), false),
            ]
        );
        assert_eq!(sink.stdout_count(), 3);
        assert_eq!(sink.stderr_count(), 0);
    }

    #[tokio::test]
    async fn consume_forwards_stream_errors_to_stderr() {
        let collector = CollectingSink::new();
        let sink = CountingSink::new(collector.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(TailEvent::Error("stream torn down".to_owned()))
            .unwrap();
        drop(tx);

        consume(rx, sink.clone()).await;

        assert_eq!(collector.lines(), vec![("stream torn down".to_owned(), true)]);
        assert_eq!(sink.stderr_count(), 1);
    }
}
