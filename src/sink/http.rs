//! HTTP chat sink: JSON POST to webhook-style endpoint addresses.

use super::{ChatSink, RenderedMessage, SinkAck, SinkError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Webhook sink with a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpChatSink {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChatSink {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl ChatSink for HttpChatSink {
    async fn post(&self, address: &str, message: &RenderedMessage) -> Result<SinkAck, SinkError> {
        debug!(address = %address, render_mode = %message.render_mode, "📮 Posting to chat endpoint");

        let response = self
            .client
            .post(address)
            .timeout(self.timeout)
            .json(&message.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    SinkError::Unreachable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(SinkAck {
                status_code: status.as_u16(),
            })
        } else {
            Err(SinkError::Status {
                code: status.as_u16(),
            })
        }
    }
}
