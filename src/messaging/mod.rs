//! # Work Queue Messaging
//!
//! The Tier-1 seam: a durable asynchronous work queue the orchestrator
//! submits events to. "Success" here means the queue accepted the job;
//! actual delivery happens out-of-band. A connectivity failure surfaces as
//! [`QueueError::Connection`] and drives tier escalation.

pub mod pgmq_queue;

use crate::events::CrmEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use pgmq_queue::PgmqWorkQueue;

/// Work queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue connection error: {message}")]
    Connection { message: String },

    #[error("Queue submission failed: {queue_name}: {message}")]
    Submission { queue_name: String, message: String },

    #[error("Message serialization error: {message}")]
    Serialization { message: String },
}

impl QueueError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn submission(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Submission {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }
}

/// Retry backoff hint carried with a submission
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum BackoffStrategy {
    None,
    Fixed { delay_seconds: u64 },
    Exponential { base_seconds: u64 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential { base_seconds: 30 }
    }
}

/// Submission priority hint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueuePriority {
    High,
    #[default]
    Normal,
    Low,
}

/// Delivery hints passed alongside the event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueOptions {
    pub priority: EnqueuePriority,
    pub delay_seconds: u64,
    pub max_attempts: i32,
    pub backoff: BackoffStrategy,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: EnqueuePriority::Normal,
            delay_seconds: 0,
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

/// Handle for an accepted job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub queue_name: String,
    pub message_id: i64,
}

/// The durable asynchronous work queue seam
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Submit an event with delivery hints; `Ok` means accepted, not delivered
    async fn enqueue(
        &self,
        event: &CrmEvent,
        options: EnqueueOptions,
    ) -> Result<JobHandle, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = EnqueueOptions::default();
        assert_eq!(options.priority, EnqueuePriority::Normal);
        assert_eq!(options.delay_seconds, 0);
        assert_eq!(options.max_attempts, 3);
        assert!(matches!(
            options.backoff,
            BackoffStrategy::Exponential { base_seconds: 30 }
        ));
    }

    #[test]
    fn test_backoff_serialization_shape() {
        let json = serde_json::to_value(BackoffStrategy::Fixed { delay_seconds: 10 }).unwrap();
        assert_eq!(json["strategy"], "fixed");
        assert_eq!(json["delay_seconds"], 10);
    }
}
