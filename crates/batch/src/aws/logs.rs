//! CloudWatch Logs implementation of the log backend seam.
//!
//! `start_live_tail` opens the server-pushed stream and spawns a
//! forwarding task that converts SDK stream events into [`TailEvent`]s
//! on an unbounded channel. The task runs until the stream ends, an
//! error occurs, or the returned cancellation token fires.

use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::types as lt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{LiveTail, LogBackend, TailEvent};
use crate::error::BackendError;

/// Log backend talking to CloudWatch Logs.
pub struct AwsLogBackend {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl AwsLogBackend {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatchlogs::Client::new(sdk_config),
        }
    }
}

fn logs_err(e: impl Into<aws_sdk_cloudwatchlogs::Error>) -> BackendError {
    BackendError::Api(e.into().to_string())
}

#[async_trait]
impl LogBackend for AwsLogBackend {
    async fn resolve_log_group(
        &self,
        name: &str,
        region: &str,
    ) -> Result<Option<String>, BackendError> {
        let output = self
            .client
            .describe_log_groups()
            .log_group_name_prefix(name)
            .send()
            .await
            .map_err(logs_err)?;

        // The prefix match can span regions; pin it down by ARN. Tail
        // identifiers reject the trailing wildcard some ARNs carry.
        Ok(output
            .log_groups()
            .iter()
            .filter_map(|group| group.arn())
            .find(|arn| arn.contains(region))
            .map(|arn| arn.strip_suffix('*').unwrap_or(arn).to_owned()))
    }

    async fn create_log_group(&self, name: &str) -> Result<(), BackendError> {
        self.client
            .create_log_group()
            .log_group_name(name)
            .send()
            .await
            .map_err(logs_err)?;
        Ok(())
    }

    async fn start_live_tail(
        &self,
        log_group_arn: &str,
        stream_prefix: &str,
    ) -> Result<LiveTail, BackendError> {
        let output = self
            .client
            .start_live_tail()
            .log_group_identifiers(log_group_arn)
            .log_stream_name_prefixes(stream_prefix)
            .send()
            .await
            .map_err(logs_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let mut stream = output.response_stream;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = stream.recv() => match event {
                        Ok(Some(lt::StartLiveTailResponseStream::SessionStart(_))) => {
                            let _ = tx.send(TailEvent::SessionStart);
                        }
                        Ok(Some(lt::StartLiveTailResponseStream::SessionUpdate(update))) => {
                            let records = update
                                .session_results()
                                .iter()
                                .filter_map(|e| e.message().map(str::to_owned))
                                .collect();
                            let _ = tx.send(TailEvent::Update(records));
                        }
                        Ok(Some(_)) => {
                            // Event outside the known set: a protocol
                            // error the tail cannot recover from.
                            let _ = tx.send(TailEvent::Error(
                                "unknown live tail event type".to_owned(),
                            ));
                            break;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(TailEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
            }
        });

        Ok(LiveTail { events: rx, cancel })
    }
}
