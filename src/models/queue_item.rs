//! # Queue Item Model
//!
//! The persisted delivery unit behind Tiers 3 and 4. A row is created when
//! synchronous delivery has already failed (batch) or an unexpected error
//! occurred (manual recovery), and is replayed later by the batch sweep or
//! an operator-triggered retry.
//!
//! ## Concurrency contract
//!
//! Every state-changing update here is conditional on the row's current
//! status (`UPDATE ... WHERE status = 'pending'`), and claims use
//! `FOR UPDATE SKIP LOCKED`, so the periodic watchdog and a normal retry
//! path racing on the same row cannot double-process it. No external
//! locking exists anywhere in the crate.

use crate::state_machine::{DeliveryTier, QueueItemStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A delivery queue row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueItem {
    pub delivery_id: Uuid,
    pub tenant_id: Option<i64>,
    /// Raw inbound event, replayed as-is by the sweep
    pub payload: serde_json::Value,
    pub status: String,
    pub tier: String,
    pub retry_count: i32,
    pub scheduled_for: DateTime<Utc>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New queue item for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub delivery_id: Uuid,
    pub tenant_id: Option<i64>,
    pub payload: serde_json::Value,
    pub status: QueueItemStatus,
    pub tier: DeliveryTier,
    pub scheduled_for: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl QueueItem {
    /// Typed view of the stored status
    pub fn parsed_status(&self) -> Option<QueueItemStatus> {
        self.status.parse().ok()
    }

    /// Typed view of the stored tier
    pub fn parsed_tier(&self) -> Option<DeliveryTier> {
        self.tier.parse().ok()
    }

    /// Persist a new queue item
    pub async fn insert(pool: &PgPool, new: NewQueueItem) -> Result<QueueItem, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            INSERT INTO relay_delivery_queue (
                delivery_id, tenant_id, payload, status, tier, retry_count,
                scheduled_for, error_message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, NOW(), NOW())
            RETURNING delivery_id, tenant_id, payload, status, tier, retry_count,
                      scheduled_for, error_message, created_at, updated_at
            "#,
        )
        .bind(new.delivery_id)
        .bind(new.tenant_id)
        .bind(new.payload)
        .bind(new.status.to_string())
        .bind(new.tier.to_string())
        .bind(new.scheduled_for)
        .bind(new.error_message)
        .fetch_one(pool)
        .await
    }

    /// Atomically claim due replayable rows for a sweep run, bounded to one
    /// page: batch rows plus manual-recovery rows an operator requeued.
    /// `SKIP LOCKED` keeps concurrent sweeps from contending on the same rows.
    pub async fn claim_due_batch(pool: &PgPool, page_size: i64) -> Result<Vec<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE relay_delivery_queue
            SET status = 'processing', updated_at = NOW()
            WHERE delivery_id IN (
                SELECT delivery_id FROM relay_delivery_queue
                WHERE status = 'pending' AND tier IN ('batch', 'manual')
                  AND scheduled_for <= NOW()
                ORDER BY scheduled_for ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING delivery_id, tenant_id, payload, status, tier, retry_count,
                      scheduled_for, error_message, created_at, updated_at
            "#,
        )
        .bind(page_size)
        .fetch_all(pool)
        .await
    }

    /// Mark a claimed row completed; no-op if another path already moved it
    pub async fn mark_completed(pool: &PgPool, delivery_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_delivery_queue
            SET status = 'completed', error_message = NULL, updated_at = NOW()
            WHERE delivery_id = $1 AND status = 'processing'
            "#,
        )
        .bind(delivery_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a claimed row failed and count the attempt
    pub async fn mark_failed(
        pool: &PgPool,
        delivery_id: Uuid,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_delivery_queue
            SET status = 'failed', retry_count = retry_count + 1,
                error_message = $2, updated_at = NOW()
            WHERE delivery_id = $1 AND status = 'processing'
            "#,
        )
        .bind(delivery_id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The bounded failed -> pending retry edge: requeue failed rows under
    /// the retry cap, up to `limit` rows
    pub async fn requeue_failed(
        pool: &PgPool,
        max_auto_retries: i32,
        limit: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_delivery_queue
            SET status = 'pending', scheduled_for = NOW(),
                retry_count = retry_count + 1, updated_at = NOW()
            WHERE delivery_id IN (
                SELECT delivery_id FROM relay_delivery_queue
                WHERE status = 'failed' AND retry_count < $1
                ORDER BY updated_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(max_auto_retries)
        .bind(limit)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// The manual_recovery -> pending retry edge: requeue parked rows whose
    /// retry time has come, up to `limit` rows. The sweep then replays them.
    pub async fn requeue_due_manual(pool: &PgPool, limit: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_delivery_queue
            SET status = 'pending', scheduled_for = NOW(),
                retry_count = retry_count + 1, updated_at = NOW()
            WHERE delivery_id IN (
                SELECT delivery_id FROM relay_delivery_queue
                WHERE status = 'manual_recovery' AND scheduled_for <= NOW()
                ORDER BY scheduled_for ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(limit)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Reschedule pending rows stuck past a max age to be due now
    pub async fn reschedule_stuck_pending(
        pool: &PgPool,
        max_age_minutes: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_delivery_queue
            SET scheduled_for = NOW(), updated_at = NOW()
            WHERE status = 'pending'
              AND scheduled_for < NOW() - make_interval(mins => $1::int)
            "#,
        )
        .bind(max_age_minutes as i32)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark malformed rows failed instead of retrying them forever:
    /// null payloads or payloads missing the required event-type field
    pub async fn mark_malformed_failed(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_delivery_queue
            SET status = 'failed', retry_count = retry_count + 1,
                error_message = 'malformed payload', updated_at = NOW()
            WHERE status = 'pending'
              AND (payload IS NULL
                   OR jsonb_typeof(payload) <> 'object'
                   OR NOT payload ? 'event_type')
            "#,
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Release processing claims older than the stale-lock horizon
    pub async fn release_stale_processing(
        pool: &PgPool,
        older_than_minutes: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_delivery_queue
            SET status = 'pending', scheduled_for = NOW(), updated_at = NOW()
            WHERE status = 'processing'
              AND updated_at < NOW() - make_interval(mins => $1::int)
            "#,
        )
        .bind(older_than_minutes as i32)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Failed rows within a trailing window
    pub async fn count_failed_since(pool: &PgPool, window_hours: i64) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM relay_delivery_queue
            WHERE status = 'failed'
              AND updated_at > NOW() - make_interval(hours => $1::int)
            "#,
        )
        .bind(window_hours as i32)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Due batch rows older than the given age (the drainable backlog)
    pub async fn count_batch_backlog(
        pool: &PgPool,
        older_than_minutes: i64,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM relay_delivery_queue
            WHERE status = 'pending' AND tier = 'batch'
              AND scheduled_for < NOW() - make_interval(mins => $1::int)
            "#,
        )
        .bind(older_than_minutes as i32)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
