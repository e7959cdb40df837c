//! # Chat Sink
//!
//! The outbound boundary: posting a rendered message to a chat endpoint
//! address. Rendering itself (template substitution into text/card bodies)
//! happens outside the core; the sink carries the body opaquely.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpChatSink;

/// Chat sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Chat endpoint returned status {code}")]
    Status { code: u16 },

    #[error("Chat endpoint unreachable: {message}")]
    Unreachable { message: String },

    #[error("Chat send timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// An opaque rendered message body plus minimal routing context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Rendering mode the downstream renderer used (opaque to the core)
    pub render_mode: String,
    /// The message body as the endpoint expects it
    pub body: serde_json::Value,
}

impl RenderedMessage {
    pub fn new(render_mode: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            render_mode: render_mode.into(),
            body,
        }
    }
}

/// Acknowledgement from the endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkAck {
    pub status_code: u16,
}

/// The outbound chat boundary
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Post a message to an endpoint address
    async fn post(&self, address: &str, message: &RenderedMessage) -> Result<SinkAck, SinkError>;
}
