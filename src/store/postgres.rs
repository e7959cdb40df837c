//! Postgres-backed `DeliveryStore`, delegating to the model layer.

use crate::error::Result;
use crate::models::delivery_log::DeliveryStats;
use crate::models::tenant::SharedUserMapping;
use crate::models::{
    ChannelEndpoint, DeliveryLogEntry, NewDeliveryLogEntry, NewQueueItem, QueueItem, Rule, Tenant,
};
use crate::store::DeliveryStore;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Production store over a shared connection pool
#[derive(Debug, Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn find_tenant_by_company_id(&self, company_id: &str) -> Result<Option<Tenant>> {
        Ok(Tenant::find_by_company_id(&self.pool, company_id).await?)
    }

    async fn find_tenant_by_user_id(&self, user_id: &str) -> Result<Option<Tenant>> {
        Ok(Tenant::find_by_user_id(&self.pool, user_id).await?)
    }

    async fn bind_company_id(&self, tenant_id: i64, company_id: &str) -> Result<bool> {
        Ok(Tenant::bind_company_id(&self.pool, tenant_id, company_id).await?)
    }

    async fn upsert_tenant_for_company(
        &self,
        company_id: &str,
        display_name: &str,
    ) -> Result<Tenant> {
        Ok(Tenant::upsert_for_company(&self.pool, company_id, display_name).await?)
    }

    async fn adoption_candidates(&self) -> Result<Vec<Tenant>> {
        Ok(Tenant::adoption_candidates(&self.pool).await?)
    }

    async fn unmapped_tenants_with_rules(&self) -> Result<Vec<Tenant>> {
        Ok(Tenant::unmapped_with_rules(&self.pool).await?)
    }

    async fn shared_user_mappings(&self) -> Result<Vec<SharedUserMapping>> {
        Ok(Tenant::shared_user_mappings(&self.pool).await?)
    }

    async fn enabled_rules(&self, tenant_id: i64) -> Result<Vec<Rule>> {
        Ok(Rule::list_enabled(&self.pool, tenant_id).await?)
    }

    async fn active_endpoints(&self, tenant_id: i64) -> Result<Vec<ChannelEndpoint>> {
        Ok(ChannelEndpoint::list_active(&self.pool, tenant_id).await?)
    }

    async fn count_active_endpoints_sample(&self, limit: i64) -> Result<i64> {
        Ok(ChannelEndpoint::count_active_sample(&self.pool, limit).await?)
    }

    async fn insert_queue_item(&self, item: NewQueueItem) -> Result<QueueItem> {
        Ok(QueueItem::insert(&self.pool, item).await?)
    }

    async fn claim_due_batch_items(&self, page_size: i64) -> Result<Vec<QueueItem>> {
        Ok(QueueItem::claim_due_batch(&self.pool, page_size).await?)
    }

    async fn complete_queue_item(&self, delivery_id: Uuid) -> Result<bool> {
        Ok(QueueItem::mark_completed(&self.pool, delivery_id).await?)
    }

    async fn fail_queue_item(&self, delivery_id: Uuid, error: &str) -> Result<bool> {
        Ok(QueueItem::mark_failed(&self.pool, delivery_id, error).await?)
    }

    async fn requeue_failed(&self, max_auto_retries: i32, limit: i64) -> Result<u64> {
        Ok(QueueItem::requeue_failed(&self.pool, max_auto_retries, limit).await?)
    }

    async fn requeue_due_manual(&self, limit: i64) -> Result<u64> {
        Ok(QueueItem::requeue_due_manual(&self.pool, limit).await?)
    }

    async fn reschedule_stuck_pending(&self, max_age_minutes: i64) -> Result<u64> {
        Ok(QueueItem::reschedule_stuck_pending(&self.pool, max_age_minutes).await?)
    }

    async fn mark_malformed_failed(&self) -> Result<u64> {
        Ok(QueueItem::mark_malformed_failed(&self.pool).await?)
    }

    async fn release_stale_processing(&self, older_than_minutes: i64) -> Result<u64> {
        Ok(QueueItem::release_stale_processing(&self.pool, older_than_minutes).await?)
    }

    async fn count_failed_since(&self, window_hours: i64) -> Result<i64> {
        Ok(QueueItem::count_failed_since(&self.pool, window_hours).await?)
    }

    async fn count_batch_backlog(&self, older_than_minutes: i64) -> Result<i64> {
        Ok(QueueItem::count_batch_backlog(&self.pool, older_than_minutes).await?)
    }

    async fn append_delivery_log(&self, entry: NewDeliveryLogEntry) -> Result<()> {
        Ok(DeliveryLogEntry::append(&self.pool, entry).await?)
    }

    async fn delivery_stats(&self, window_hours: i64) -> Result<DeliveryStats> {
        Ok(DeliveryLogEntry::stats(&self.pool, window_hours).await?)
    }

    async fn recent_company_ids_for_tenant(
        &self,
        tenant_id: i64,
        limit: i64,
    ) -> Result<Vec<String>> {
        Ok(DeliveryLogEntry::recent_company_ids(&self.pool, tenant_id, limit).await?)
    }

    async fn purge_delivery_logs(&self, retention_days: i64, batch_size: i64) -> Result<u64> {
        Ok(DeliveryLogEntry::purge_older_than(&self.pool, retention_days, batch_size).await?)
    }
}
