//! # Channel Endpoint Model
//!
//! A destination address notifications are sent to. The name and description
//! double as routing tags: the router does case-insensitive keyword search
//! over them (e.g. an endpoint named "Executive Deals" catches high-value
//! routing).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A chat endpoint row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChannelEndpoint {
    pub endpoint_id: i64,
    pub tenant_id: i64,
    /// Destination address understood by the chat sink
    pub address: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ChannelEndpoint {
    /// Active endpoints for a tenant, stable order for deterministic fallback
    pub async fn list_active(
        pool: &PgPool,
        tenant_id: i64,
    ) -> Result<Vec<ChannelEndpoint>, sqlx::Error> {
        sqlx::query_as::<_, ChannelEndpoint>(
            r#"
            SELECT endpoint_id, tenant_id, address, name, description, active, created_at
            FROM relay_endpoints
            WHERE tenant_id = $1 AND active
            ORDER BY created_at ASC, endpoint_id ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Count active endpoints over a bounded sample (watchdog check; no live probe)
    pub async fn count_active_sample(pool: &PgPool, limit: i64) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM (
                SELECT endpoint_id FROM relay_endpoints
                WHERE active
                ORDER BY endpoint_id ASC
                LIMIT $1
            ) sample
            "#,
        )
        .bind(limit)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// The haystack the router searches for category keywords
    pub fn routing_text(&self) -> String {
        match &self.description {
            Some(desc) => format!("{} {}", self.name, desc).to_lowercase(),
            None => self.name.to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(name: &str, description: Option<&str>) -> ChannelEndpoint {
        ChannelEndpoint {
            endpoint_id: 1,
            tenant_id: 1,
            address: "#general".to_string(),
            name: name.to_string(),
            description: description.map(String::from),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_routing_text_is_lowercased_name_and_description() {
        let ep = endpoint("Executive Deals", Some("VIP notifications"));
        assert_eq!(ep.routing_text(), "executive deals vip notifications");

        let ep = endpoint("Wins", None);
        assert_eq!(ep.routing_text(), "wins");
    }
}
