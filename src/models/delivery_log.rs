//! # Delivery Log Model
//!
//! Append-only audit trail: one row per tier attempt, never mutated after
//! insert. The watchdog reads it for delivery stats and for the
//! majority-vote tenant auto-mapping; retention cleanup deletes old rows in
//! bounded batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// An audit row for a single tier attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DeliveryLogEntry {
    pub log_id: i64,
    pub delivery_id: Uuid,
    pub tier: String,
    pub status: String,
    /// Structured attempt result; carries tenant/company ids for auto-mapping
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// New log entry for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeliveryLogEntry {
    pub delivery_id: Uuid,
    pub tier: String,
    pub status: String,
    pub result: Option<serde_json::Value>,
}

/// Aggregated delivery statistics over a trailing window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub window_hours: i64,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
}

impl DeliveryLogEntry {
    /// Append an attempt record. The table is insert-only.
    pub async fn append(pool: &PgPool, entry: NewDeliveryLogEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO relay_delivery_log (delivery_id, tier, status, result, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(entry.delivery_id)
        .bind(entry.tier)
        .bind(entry.status)
        .bind(entry.result)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Success rate and average first-to-last-attempt latency per delivery
    /// over a trailing window
    pub async fn stats(pool: &PgPool, window_hours: i64) -> Result<DeliveryStats, sqlx::Error> {
        let (total, successful, avg_latency_ms): (i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE succeeded),
                   AVG(latency_ms)
            FROM (
                SELECT delivery_id,
                       BOOL_OR(status = 'success') AS succeeded,
                       EXTRACT(EPOCH FROM (MAX(created_at) - MIN(created_at))) * 1000
                           AS latency_ms
                FROM relay_delivery_log
                WHERE created_at > NOW() - make_interval(hours => $1::int)
                GROUP BY delivery_id
            ) per_delivery
            "#,
        )
        .bind(window_hours as i32)
        .fetch_one(pool)
        .await?;

        let success_rate = if total > 0 {
            successful as f64 / total as f64
        } else {
            1.0
        };

        Ok(DeliveryStats {
            window_hours,
            total_deliveries: total,
            successful_deliveries: successful,
            success_rate,
            avg_latency_ms: avg_latency_ms.unwrap_or(0.0),
        })
    }

    /// Recent company ids this tenant delivered for, newest first
    /// (majority-vote auto-mapping input). Rows logged without a company id
    /// (JSON null or absent key) are not votes.
    pub async fn recent_company_ids(
        pool: &PgPool,
        tenant_id: i64,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT result->>'company_id'
            FROM relay_delivery_log
            WHERE (result->>'tenant_id')::bigint = $1
              AND result->>'company_id' IS NOT NULL
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Delete rows past the retention horizon, bounded per pass
    pub async fn purge_older_than(
        pool: &PgPool,
        retention_days: i64,
        batch_size: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM relay_delivery_log
            WHERE log_id IN (
                SELECT log_id FROM relay_delivery_log
                WHERE created_at < NOW() - make_interval(days => $1::int)
                ORDER BY log_id ASC
                LIMIT $2
            )
            "#,
        )
        .bind(retention_days as i32)
        .bind(batch_size)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
