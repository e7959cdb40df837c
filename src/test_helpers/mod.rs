//! # Test Helpers
//!
//! An in-memory `DeliveryStore` for tests and examples. It honors the same
//! conditional-update semantics as the Postgres store (status-guarded
//! transitions, single-winner bindings, bounded pages) under one lock, so
//! pipeline and watchdog behavior can be exercised without a database.

use crate::error::{RelayError, Result};
use crate::models::delivery_log::DeliveryStats;
use crate::models::tenant::SharedUserMapping;
use crate::models::{
    ChannelEndpoint, DeliveryLogEntry, NewDeliveryLogEntry, NewQueueItem, QueueItem, Rule, Tenant,
};
use crate::state_machine::{DeliveryTier, QueueItemStatus};
use crate::store::DeliveryStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    tenants: Vec<Tenant>,
    rules: Vec<Rule>,
    endpoints: Vec<ChannelEndpoint>,
    queue: HashMap<Uuid, QueueItem>,
    logs: Vec<DeliveryLogEntry>,
    next_tenant_id: i64,
    next_rule_id: i64,
    next_endpoint_id: i64,
    next_log_id: i64,
}

/// Lock-guarded store with the production conditional semantics
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    /// When set, tenant lookups error (simulates an unreachable database)
    pub fail_tenant_lookups: AtomicBool,
    /// When set, queue-item inserts error (exercises the fallback log path)
    pub fail_queue_inserts: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- seeding ---

    pub fn seed_tenant(
        &self,
        company_id: Option<&str>,
        user_id: Option<&str>,
        display_name: &str,
    ) -> i64 {
        let mut inner = self.inner.lock();
        if let Some(company_id) = company_id {
            // Same uniqueness the schema enforces on external_company_id
            assert!(
                !inner
                    .tenants
                    .iter()
                    .any(|t| t.external_company_id.as_deref() == Some(company_id)),
                "company id {company_id} is already mapped"
            );
        }
        inner.next_tenant_id += 1;
        let tenant_id = inner.next_tenant_id;
        let now = Utc::now();
        inner.tenants.push(Tenant {
            tenant_id,
            external_company_id: company_id.map(String::from),
            external_user_id: user_id.map(String::from),
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
        });
        tenant_id
    }

    pub fn seed_rule(
        &self,
        tenant_id: i64,
        event_pattern: &str,
        priority: i32,
        filters: Option<serde_json::Value>,
    ) -> i64 {
        self.seed_rule_with(tenant_id, event_pattern, priority, filters, None, None)
    }

    pub fn seed_rule_with(
        &self,
        tenant_id: i64,
        event_pattern: &str,
        priority: i32,
        filters: Option<serde_json::Value>,
        pinned_endpoint_id: Option<i64>,
        default_endpoint_id: Option<i64>,
    ) -> i64 {
        let mut inner = self.inner.lock();
        inner.next_rule_id += 1;
        let rule_id = inner.next_rule_id;
        inner.rules.push(Rule {
            rule_id,
            tenant_id,
            event_pattern: event_pattern.to_string(),
            priority,
            enabled: true,
            filters,
            pinned_endpoint_id,
            default_endpoint_id,
            render_mode: "text".to_string(),
            created_at: Utc::now(),
        });
        rule_id
    }

    pub fn seed_endpoint(
        &self,
        tenant_id: i64,
        address: &str,
        name: &str,
        description: Option<&str>,
    ) -> i64 {
        let mut inner = self.inner.lock();
        inner.next_endpoint_id += 1;
        let endpoint_id = inner.next_endpoint_id;
        inner.endpoints.push(ChannelEndpoint {
            endpoint_id,
            tenant_id,
            address: address.to_string(),
            name: name.to_string(),
            description: description.map(String::from),
            active: true,
            created_at: Utc::now(),
        });
        endpoint_id
    }

    /// Seed a queue row directly in a given state
    pub fn seed_queue_item(
        &self,
        status: QueueItemStatus,
        tier: DeliveryTier,
        retry_count: i32,
        scheduled_for: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Uuid {
        let delivery_id = Uuid::new_v4();
        let now = Utc::now();
        let item = QueueItem {
            delivery_id,
            tenant_id: None,
            payload,
            status: status.to_string(),
            tier: tier.to_string(),
            retry_count,
            scheduled_for,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().queue.insert(delivery_id, item);
        delivery_id
    }

    /// Backdate a row's updated_at (for stale-claim and window tests)
    pub fn backdate_item(&self, delivery_id: Uuid, minutes: i64) {
        if let Some(item) = self.inner.lock().queue.get_mut(&delivery_id) {
            item.updated_at = Utc::now() - ChronoDuration::minutes(minutes);
        }
    }

    /// Seed delivery-log rows carrying company-id votes for a tenant
    pub fn seed_log_company_votes(&self, tenant_id: i64, company_ids: &[&str]) {
        let mut inner = self.inner.lock();
        for company_id in company_ids {
            inner.next_log_id += 1;
            let log_id = inner.next_log_id;
            inner.logs.push(DeliveryLogEntry {
                log_id,
                delivery_id: Uuid::new_v4(),
                tier: "direct".to_string(),
                status: "success".to_string(),
                result: Some(serde_json::json!({
                    "tenant_id": tenant_id,
                    "company_id": company_id,
                })),
                created_at: Utc::now(),
            });
        }
    }

    // --- inspection ---

    pub fn queue_item(&self, delivery_id: Uuid) -> Option<QueueItem> {
        self.inner.lock().queue.get(&delivery_id).cloned()
    }

    pub fn queue_items(&self) -> Vec<QueueItem> {
        self.inner.lock().queue.values().cloned().collect()
    }

    pub fn tenant_count(&self) -> usize {
        self.inner.lock().tenants.len()
    }

    pub fn log_entries(&self) -> Vec<DeliveryLogEntry> {
        self.inner.lock().logs.clone()
    }

    fn check_tenant_failpoint(&self) -> Result<()> {
        if self.fail_tenant_lookups.load(Ordering::SeqCst) {
            Err(RelayError::database("tenant lookup", "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeliveryStore for InMemoryStore {
    async fn find_tenant_by_company_id(&self, company_id: &str) -> Result<Option<Tenant>> {
        self.check_tenant_failpoint()?;
        Ok(self
            .inner
            .lock()
            .tenants
            .iter()
            .find(|t| t.external_company_id.as_deref() == Some(company_id))
            .cloned())
    }

    async fn find_tenant_by_user_id(&self, user_id: &str) -> Result<Option<Tenant>> {
        self.check_tenant_failpoint()?;
        Ok(self
            .inner
            .lock()
            .tenants
            .iter()
            .find(|t| t.external_user_id.as_deref() == Some(user_id))
            .cloned())
    }

    async fn bind_company_id(&self, tenant_id: i64, company_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let taken = inner
            .tenants
            .iter()
            .any(|t| t.external_company_id.as_deref() == Some(company_id));
        if taken {
            return Ok(false);
        }
        let Some(tenant) = inner.tenants.iter_mut().find(|t| t.tenant_id == tenant_id) else {
            return Ok(false);
        };
        if tenant.external_company_id.is_some() {
            return Ok(false);
        }
        tenant.external_company_id = Some(company_id.to_string());
        tenant.updated_at = Utc::now();
        Ok(true)
    }

    async fn upsert_tenant_for_company(
        &self,
        company_id: &str,
        display_name: &str,
    ) -> Result<Tenant> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .tenants
            .iter()
            .find(|t| t.external_company_id.as_deref() == Some(company_id))
        {
            return Ok(existing.clone());
        }
        inner.next_tenant_id += 1;
        let tenant_id = inner.next_tenant_id;
        let now = Utc::now();
        let tenant = Tenant {
            tenant_id,
            external_company_id: Some(company_id.to_string()),
            external_user_id: None,
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.tenants.push(tenant.clone());
        Ok(tenant)
    }

    async fn adoption_candidates(&self) -> Result<Vec<Tenant>> {
        let inner = self.inner.lock();
        let mut candidates: Vec<Tenant> = inner
            .tenants
            .iter()
            .filter(|t| {
                t.external_company_id.is_none()
                    && inner
                        .rules
                        .iter()
                        .any(|r| r.tenant_id == t.tenant_id && r.enabled)
                    && inner
                        .endpoints
                        .iter()
                        .any(|e| e.tenant_id == t.tenant_id && e.active)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|t| t.created_at);
        Ok(candidates)
    }

    async fn unmapped_tenants_with_rules(&self) -> Result<Vec<Tenant>> {
        let inner = self.inner.lock();
        let mut tenants: Vec<Tenant> = inner
            .tenants
            .iter()
            .filter(|t| {
                t.external_company_id.is_none()
                    && inner
                        .rules
                        .iter()
                        .any(|r| r.tenant_id == t.tenant_id && r.enabled)
            })
            .cloned()
            .collect();
        tenants.sort_by_key(|t| t.created_at);
        Ok(tenants)
    }

    async fn shared_user_mappings(&self) -> Result<Vec<SharedUserMapping>> {
        let inner = self.inner.lock();
        let mut by_user: HashMap<&str, Vec<i64>> = HashMap::new();
        for tenant in &inner.tenants {
            if let Some(user_id) = tenant.external_user_id.as_deref() {
                by_user.entry(user_id).or_default().push(tenant.tenant_id);
            }
        }
        let mut shared: Vec<SharedUserMapping> = by_user
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(user_id, mut tenant_ids)| {
                tenant_ids.sort_unstable();
                SharedUserMapping {
                    external_user_id: user_id.to_string(),
                    tenant_ids,
                }
            })
            .collect();
        shared.sort_by(|a, b| a.external_user_id.cmp(&b.external_user_id));
        Ok(shared)
    }

    async fn enabled_rules(&self, tenant_id: i64) -> Result<Vec<Rule>> {
        let inner = self.inner.lock();
        let mut rules: Vec<Rule> = inner
            .rules
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.enabled)
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(rules)
    }

    async fn active_endpoints(&self, tenant_id: i64) -> Result<Vec<ChannelEndpoint>> {
        let inner = self.inner.lock();
        let mut endpoints: Vec<ChannelEndpoint> = inner
            .endpoints
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.active)
            .cloned()
            .collect();
        endpoints.sort_by_key(|e| (e.created_at, e.endpoint_id));
        Ok(endpoints)
    }

    async fn count_active_endpoints_sample(&self, limit: i64) -> Result<i64> {
        let inner = self.inner.lock();
        let active = inner.endpoints.iter().filter(|e| e.active).count() as i64;
        Ok(active.min(limit))
    }

    async fn insert_queue_item(&self, item: NewQueueItem) -> Result<QueueItem> {
        if self.fail_queue_inserts.load(Ordering::SeqCst) {
            return Err(RelayError::database("insert_queue_item", "injected failure"));
        }
        let now = Utc::now();
        let row = QueueItem {
            delivery_id: item.delivery_id,
            tenant_id: item.tenant_id,
            payload: item.payload,
            status: item.status.to_string(),
            tier: item.tier.to_string(),
            retry_count: 0,
            scheduled_for: item.scheduled_for,
            error_message: item.error_message,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().queue.insert(item.delivery_id, row.clone());
        Ok(row)
    }

    async fn claim_due_batch_items(&self, page_size: i64) -> Result<Vec<QueueItem>> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut due: Vec<(DateTime<Utc>, Uuid)> = inner
            .queue
            .values()
            .filter(|i| {
                i.status == "pending"
                    && (i.tier == "batch" || i.tier == "manual")
                    && i.scheduled_for <= now
            })
            .map(|i| (i.scheduled_for, i.delivery_id))
            .collect();
        due.sort();

        let mut claimed = Vec::new();
        for (_, delivery_id) in due.into_iter().take(page_size.max(0) as usize) {
            if let Some(item) = inner.queue.get_mut(&delivery_id) {
                item.status = "processing".to_string();
                item.updated_at = now;
                claimed.push(item.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_queue_item(&self, delivery_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.queue.get_mut(&delivery_id) {
            if item.status == "processing" {
                item.status = "completed".to_string();
                item.error_message = None;
                item.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn fail_queue_item(&self, delivery_id: Uuid, error: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.queue.get_mut(&delivery_id) {
            if item.status == "processing" {
                item.status = "failed".to_string();
                item.retry_count += 1;
                item.error_message = Some(error.to_string());
                item.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn requeue_failed(&self, max_auto_retries: i32, limit: i64) -> Result<u64> {
        let mut inner = self.inner.lock();
        let mut eligible: Vec<(DateTime<Utc>, Uuid)> = inner
            .queue
            .values()
            .filter(|i| i.status == "failed" && i.retry_count < max_auto_retries)
            .map(|i| (i.updated_at, i.delivery_id))
            .collect();
        eligible.sort();

        let now = Utc::now();
        let mut requeued = 0u64;
        for (_, delivery_id) in eligible.into_iter().take(limit.max(0) as usize) {
            if let Some(item) = inner.queue.get_mut(&delivery_id) {
                item.status = "pending".to_string();
                item.scheduled_for = now;
                item.retry_count += 1;
                item.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn requeue_due_manual(&self, limit: i64) -> Result<u64> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut due: Vec<(DateTime<Utc>, Uuid)> = inner
            .queue
            .values()
            .filter(|i| i.status == "manual_recovery" && i.scheduled_for <= now)
            .map(|i| (i.scheduled_for, i.delivery_id))
            .collect();
        due.sort();

        let mut requeued = 0u64;
        for (_, delivery_id) in due.into_iter().take(limit.max(0) as usize) {
            if let Some(item) = inner.queue.get_mut(&delivery_id) {
                item.status = "pending".to_string();
                item.scheduled_for = now;
                item.retry_count += 1;
                item.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn reschedule_stuck_pending(&self, max_age_minutes: i64) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::minutes(max_age_minutes);
        let mut inner = self.inner.lock();
        let mut rescheduled = 0u64;
        for item in inner.queue.values_mut() {
            if item.status == "pending" && item.scheduled_for < cutoff {
                item.scheduled_for = now;
                item.updated_at = now;
                rescheduled += 1;
            }
        }
        Ok(rescheduled)
    }

    async fn mark_malformed_failed(&self) -> Result<u64> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut marked = 0u64;
        for item in inner.queue.values_mut() {
            let malformed = item.payload.is_null()
                || !item.payload.is_object()
                || item.payload.get("event_type").is_none();
            if item.status == "pending" && malformed {
                item.status = "failed".to_string();
                item.retry_count += 1;
                item.error_message = Some("malformed payload".to_string());
                item.updated_at = now;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn release_stale_processing(&self, older_than_minutes: i64) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::minutes(older_than_minutes);
        let mut inner = self.inner.lock();
        let mut released = 0u64;
        for item in inner.queue.values_mut() {
            if item.status == "processing" && item.updated_at < cutoff {
                item.status = "pending".to_string();
                item.scheduled_for = now;
                item.updated_at = now;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn count_failed_since(&self, window_hours: i64) -> Result<i64> {
        let cutoff = Utc::now() - ChronoDuration::hours(window_hours);
        Ok(self
            .inner
            .lock()
            .queue
            .values()
            .filter(|i| i.status == "failed" && i.updated_at > cutoff)
            .count() as i64)
    }

    async fn count_batch_backlog(&self, older_than_minutes: i64) -> Result<i64> {
        let cutoff = Utc::now() - ChronoDuration::minutes(older_than_minutes);
        Ok(self
            .inner
            .lock()
            .queue
            .values()
            .filter(|i| i.status == "pending" && i.tier == "batch" && i.scheduled_for < cutoff)
            .count() as i64)
    }

    async fn append_delivery_log(&self, entry: NewDeliveryLogEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.next_log_id += 1;
        let log_id = inner.next_log_id;
        inner.logs.push(DeliveryLogEntry {
            log_id,
            delivery_id: entry.delivery_id,
            tier: entry.tier,
            status: entry.status,
            result: entry.result,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn delivery_stats(&self, window_hours: i64) -> Result<DeliveryStats> {
        let cutoff = Utc::now() - ChronoDuration::hours(window_hours);
        let inner = self.inner.lock();

        let mut per_delivery: HashMap<Uuid, (bool, DateTime<Utc>, DateTime<Utc>)> = HashMap::new();
        for log in inner.logs.iter().filter(|l| l.created_at > cutoff) {
            let entry = per_delivery
                .entry(log.delivery_id)
                .or_insert((false, log.created_at, log.created_at));
            entry.0 |= log.status == "success";
            entry.1 = entry.1.min(log.created_at);
            entry.2 = entry.2.max(log.created_at);
        }

        let total = per_delivery.len() as i64;
        let successful = per_delivery.values().filter(|(ok, _, _)| *ok).count() as i64;
        let avg_latency_ms = if total > 0 {
            per_delivery
                .values()
                .map(|(_, first, last)| (*last - *first).num_milliseconds() as f64)
                .sum::<f64>()
                / total as f64
        } else {
            0.0
        };

        Ok(DeliveryStats {
            window_hours,
            total_deliveries: total,
            successful_deliveries: successful,
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                1.0
            },
            avg_latency_ms,
        })
    }

    async fn recent_company_ids_for_tenant(
        &self,
        tenant_id: i64,
        limit: i64,
    ) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .logs
            .iter()
            .rev()
            .filter_map(|log| {
                let result = log.result.as_ref()?;
                if result.get("tenant_id")?.as_i64()? != tenant_id {
                    return None;
                }
                // A null or absent company id is not a vote
                result.get("company_id").and_then(|c| match c {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                })
            })
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn purge_delivery_logs(&self, retention_days: i64, batch_size: i64) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        let mut inner = self.inner.lock();
        let mut purged = 0u64;
        inner.logs.retain(|log| {
            if log.created_at < cutoff && (purged as i64) < batch_size {
                purged += 1;
                false
            } else {
                true
            }
        });
        Ok(purged)
    }
}
