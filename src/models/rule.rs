//! # Rule Model
//!
//! A tenant-scoped notification policy: an event-type pattern, ordered
//! priority, a JSONB filter predicate set, and optional endpoint pins. The
//! rendering mode is carried but opaque to the core (rendering happens
//! downstream).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A notification rule row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Rule {
    pub rule_id: i64,
    pub tenant_id: i64,
    /// Event-type pattern: exact type, alias, `entity.*` wildcard, or bare entity
    pub event_pattern: String,
    pub priority: i32,
    pub enabled: bool,
    /// Filter predicate set; shape documented in `matcher::filter`
    pub filters: Option<serde_json::Value>,
    /// Endpoint pinned by the rule, taking precedence over routing
    pub pinned_endpoint_id: Option<i64>,
    /// Endpoint used when no routing step matches
    pub default_endpoint_id: Option<i64>,
    /// Message-rendering mode, opaque to the core
    pub render_mode: String,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Enabled rules for a tenant, ordered by priority then creation time
    pub async fn list_enabled(pool: &PgPool, tenant_id: i64) -> Result<Vec<Rule>, sqlx::Error> {
        sqlx::query_as::<_, Rule>(
            r#"
            SELECT rule_id, tenant_id, event_pattern, priority, enabled, filters,
                   pinned_endpoint_id, default_endpoint_id, render_mode, created_at
            FROM relay_rules
            WHERE tenant_id = $1 AND enabled
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }
}
