//! # PostgreSQL Message Queue (pgmq-rs)
//!
//! Tier-1 work queue over the pgmq-rs crate. The delivery hints ride inside
//! the message envelope; pgmq itself only understands the visibility delay.

use super::{EnqueueOptions, JobHandle, QueueError, WorkQueue};
use crate::events::CrmEvent;
use async_trait::async_trait;
use pgmq::PGMQueue;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Envelope persisted to the queue: the raw event plus its delivery hints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub event: CrmEvent,
    pub options: EnqueueOptions,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

/// pgmq-backed work queue
#[derive(Debug, Clone)]
pub struct PgmqWorkQueue {
    pgmq: PGMQueue,
    queue_name: String,
}

impl PgmqWorkQueue {
    /// Connect via connection string and ensure the queue exists
    pub async fn new(database_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        info!("🚀 Connecting to pgmq queue: {}", queue_name);

        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| QueueError::connection(e.to_string()))?;

        pgmq.create(queue_name)
            .await
            .map_err(|e| QueueError::submission(queue_name, format!("create failed: {e}")))?;

        info!("✅ pgmq queue ready: {}", queue_name);
        Ok(Self {
            pgmq,
            queue_name: queue_name.to_string(),
        })
    }

    /// Build from an existing connection pool (BYOP)
    pub async fn new_with_pool(pool: sqlx::PgPool, queue_name: &str) -> Result<Self, QueueError> {
        let pgmq = PGMQueue::new_with_pool(pool).await;

        pgmq.create(queue_name)
            .await
            .map_err(|e| QueueError::submission(queue_name, format!("create failed: {e}")))?;

        Ok(Self {
            pgmq,
            queue_name: queue_name.to_string(),
        })
    }
}

#[async_trait]
impl WorkQueue for PgmqWorkQueue {
    async fn enqueue(
        &self,
        event: &CrmEvent,
        options: EnqueueOptions,
    ) -> Result<JobHandle, QueueError> {
        let delay = options.delay_seconds;
        let job = DeliveryJob {
            event: event.clone(),
            options,
            enqueued_at: chrono::Utc::now(),
        };

        debug!(
            queue = %self.queue_name,
            event_type = %job.event.event_type,
            delay_seconds = delay,
            "📤 Submitting delivery job"
        );

        let message_id = if delay > 0 {
            self.pgmq
                .send_delay(&self.queue_name, &job, delay)
                .await
                .map_err(|e| QueueError::submission(&self.queue_name, e.to_string()))?
        } else {
            self.pgmq
                .send(&self.queue_name, &job)
                .await
                .map_err(|e| QueueError::submission(&self.queue_name, e.to_string()))?
        };

        debug!(
            queue = %self.queue_name,
            message_id = message_id,
            "✅ Delivery job accepted"
        );

        Ok(JobHandle {
            queue_name: self.queue_name.clone(),
            message_id,
        })
    }
}
