//! # Tenant Model
//!
//! An isolated customer account owning rules and endpoints. Tenants are
//! created by external provisioning flows; the core only *maps* them to
//! external CRM identifiers (or provisions an empty shell as the last
//! resolution step).
//!
//! ## Mapping invariant
//!
//! At most one canonical `external_company_id -> tenant` mapping is intended,
//! and the unique index enforces it outright. The conflicts that remain
//! representable are cross-column: several tenants sharing an
//! `external_user_id` (detected via [`Tenant::shared_user_mappings`]), and a
//! tenant whose delivery history votes for a company id another tenant
//! already claims (surfaced by the watchdog when the bind loses). Both are
//! reported for manual consolidation, never silently merged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

/// A tenant row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub tenant_id: i64,
    pub external_company_id: Option<String>,
    pub external_user_id: Option<String>,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A conflicting-mapping finding: one user id claimed by several tenants
/// through stale provisioning or manual edits
#[derive(Debug, Clone, FromRow)]
pub struct SharedUserMapping {
    pub external_user_id: String,
    pub tenant_ids: Vec<i64>,
}

impl Tenant {
    /// Find a tenant by its mapped external company id
    pub async fn find_by_company_id(
        pool: &PgPool,
        company_id: &str,
    ) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT tenant_id, external_company_id, external_user_id, display_name,
                   created_at, updated_at
            FROM relay_tenants
            WHERE external_company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_optional(pool)
        .await
    }

    /// Find a tenant by its mapped external user id
    pub async fn find_by_user_id(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT tenant_id, external_company_id, external_user_id, display_name,
                   created_at, updated_at
            FROM relay_tenants
            WHERE external_user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Bind a company id to an unmapped tenant. Conditional on the mapping
    /// still being absent so two racing binders cannot both win.
    pub async fn bind_company_id(
        pool: &PgPool,
        tenant_id: i64,
        company_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE relay_tenants
            SET external_company_id = $2, updated_at = NOW()
            WHERE tenant_id = $1
              AND external_company_id IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM relay_tenants WHERE external_company_id = $2
              )
            "#,
        )
        .bind(tenant_id)
        .bind(company_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Provision a tenant for a company id, converging on a single row under
    /// concurrency via the unique index on `external_company_id`.
    pub async fn upsert_for_company(
        pool: &PgPool,
        company_id: &str,
        display_name: &str,
    ) -> Result<Tenant, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO relay_tenants (external_company_id, display_name, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (external_company_id)
            DO UPDATE SET updated_at = NOW()
            RETURNING tenant_id, external_company_id, external_user_id, display_name,
                      created_at, updated_at
            "#,
        )
        .bind(company_id)
        .bind(display_name)
        .fetch_one(pool)
        .await
    }

    /// Unmapped tenants eligible for adoption: no company mapping, at least
    /// one enabled rule and one active endpoint, earliest-created first
    pub async fn adoption_candidates(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT t.tenant_id, t.external_company_id, t.external_user_id, t.display_name,
                   t.created_at, t.updated_at
            FROM relay_tenants t
            WHERE t.external_company_id IS NULL
              AND EXISTS (SELECT 1 FROM relay_rules r
                          WHERE r.tenant_id = t.tenant_id AND r.enabled)
              AND EXISTS (SELECT 1 FROM relay_endpoints e
                          WHERE e.tenant_id = t.tenant_id AND e.active)
            ORDER BY t.created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Tenants with enabled rules but no company mapping (watchdog targets)
    pub async fn unmapped_with_rules(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT t.tenant_id, t.external_company_id, t.external_user_id, t.display_name,
                   t.created_at, t.updated_at
            FROM relay_tenants t
            WHERE t.external_company_id IS NULL
              AND EXISTS (SELECT 1 FROM relay_rules r
                          WHERE r.tenant_id = t.tenant_id AND r.enabled)
            ORDER BY t.created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// User ids claimed by more than one tenant. The company-id column
    /// cannot conflict (unique index); the user-id column can, and resolving
    /// by user id would then pick an arbitrary tenant. Reported for manual
    /// consolidation, never auto-merged.
    pub async fn shared_user_mappings(
        pool: &PgPool,
    ) -> Result<Vec<SharedUserMapping>, sqlx::Error> {
        sqlx::query_as::<_, SharedUserMapping>(
            r#"
            SELECT external_user_id, array_agg(tenant_id ORDER BY tenant_id) AS tenant_ids
            FROM relay_tenants
            WHERE external_user_id IS NOT NULL
            GROUP BY external_user_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(pool)
        .await
    }
}
