//! # Durable Store
//!
//! The `DeliveryStore` trait is the single synchronization surface of the
//! crate: the orchestrator, the batch sweeper, the resolver, and the
//! watchdog all read and repair state through it, and correctness under
//! concurrency relies entirely on its conditional-update contract — every
//! state-changing queue-item operation only fires when the row is still in
//! the status the caller observed.
//!
//! Two implementations exist: [`postgres::PgDeliveryStore`] for production
//! and `test_helpers::InMemoryStore` for tests, which honors the same
//! conditional semantics.

pub mod postgres;

use crate::error::Result;
use crate::models::{
    ChannelEndpoint, NewDeliveryLogEntry, NewQueueItem, QueueItem, Rule, Tenant,
};
use async_trait::async_trait;
use uuid::Uuid;

pub use crate::models::delivery_log::DeliveryStats;
pub use crate::models::tenant::SharedUserMapping;
pub use postgres::PgDeliveryStore;

/// Relational state shared by every component of the delivery core
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    // --- tenants ---

    async fn find_tenant_by_company_id(&self, company_id: &str) -> Result<Option<Tenant>>;

    async fn find_tenant_by_user_id(&self, user_id: &str) -> Result<Option<Tenant>>;

    /// Bind a company id to an unmapped tenant; returns false if another
    /// binder won the race or the company id is already claimed
    async fn bind_company_id(&self, tenant_id: i64, company_id: &str) -> Result<bool>;

    /// Provision (or converge on) the tenant for a company id
    async fn upsert_tenant_for_company(&self, company_id: &str, display_name: &str)
        -> Result<Tenant>;

    /// Unmapped tenants with ≥1 enabled rule and ≥1 active endpoint,
    /// earliest-created first
    async fn adoption_candidates(&self) -> Result<Vec<Tenant>>;

    /// Tenants with enabled rules but no company mapping
    async fn unmapped_tenants_with_rules(&self) -> Result<Vec<Tenant>>;

    /// User ids claimed by more than one tenant; company ids cannot
    /// conflict under the schema's unique index
    async fn shared_user_mappings(&self) -> Result<Vec<SharedUserMapping>>;

    // --- rules and endpoints ---

    async fn enabled_rules(&self, tenant_id: i64) -> Result<Vec<Rule>>;

    async fn active_endpoints(&self, tenant_id: i64) -> Result<Vec<ChannelEndpoint>>;

    async fn count_active_endpoints_sample(&self, limit: i64) -> Result<i64>;

    // --- delivery queue ---

    async fn insert_queue_item(&self, item: NewQueueItem) -> Result<QueueItem>;

    /// Claim one page of due replayable rows (pending -> processing,
    /// conditional): batch rows plus requeued manual-recovery rows
    async fn claim_due_batch_items(&self, page_size: i64) -> Result<Vec<QueueItem>>;

    async fn complete_queue_item(&self, delivery_id: Uuid) -> Result<bool>;

    async fn fail_queue_item(&self, delivery_id: Uuid, error: &str) -> Result<bool>;

    /// The bounded failed -> pending retry edge
    async fn requeue_failed(&self, max_auto_retries: i32, limit: i64) -> Result<u64>;

    /// The manual_recovery -> pending retry edge for rows whose retry time
    /// has come; the sweep replays them
    async fn requeue_due_manual(&self, limit: i64) -> Result<u64>;

    async fn reschedule_stuck_pending(&self, max_age_minutes: i64) -> Result<u64>;

    async fn mark_malformed_failed(&self) -> Result<u64>;

    async fn release_stale_processing(&self, older_than_minutes: i64) -> Result<u64>;

    async fn count_failed_since(&self, window_hours: i64) -> Result<i64>;

    async fn count_batch_backlog(&self, older_than_minutes: i64) -> Result<i64>;

    // --- delivery log ---

    async fn append_delivery_log(&self, entry: NewDeliveryLogEntry) -> Result<()>;

    async fn delivery_stats(&self, window_hours: i64) -> Result<DeliveryStats>;

    async fn recent_company_ids_for_tenant(
        &self,
        tenant_id: i64,
        limit: i64,
    ) -> Result<Vec<String>>;

    async fn purge_delivery_logs(&self, retention_days: i64, batch_size: i64) -> Result<u64>;
}
