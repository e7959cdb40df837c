//! End-to-end tier escalation tests over the in-memory store: every path
//! through Queue -> Direct -> Batch -> Manual, plus duplicate suppression
//! and the fallback file of last resort.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{MockChatSink, MockWorkQueue};
use relay_core::config::RelayConfig;
use relay_core::events::CrmEvent;
use relay_core::ops::RelaySystem;
use relay_core::state_machine::DeliveryTier;
use relay_core::test_helpers::InMemoryStore;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;

struct Harness {
    system: RelaySystem,
    store: Arc<InMemoryStore>,
    queue: Arc<MockWorkQueue>,
    sink: Arc<MockChatSink>,
}

fn harness_with(config: RelayConfig, queue: MockWorkQueue, sink: MockChatSink) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(queue);
    let sink = Arc::new(sink);
    let system = RelaySystem::assemble(
        config,
        Arc::clone(&store) as Arc<dyn relay_core::store::DeliveryStore>,
        Arc::clone(&queue) as Arc<dyn relay_core::messaging::WorkQueue>,
        Arc::clone(&sink) as Arc<dyn relay_core::sink::ChatSink>,
    );
    Harness {
        system,
        store,
        queue,
        sink,
    }
}

fn harness(queue: MockWorkQueue, sink: MockChatSink) -> Harness {
    harness_with(RelayConfig::default(), queue, sink)
}

fn deal_event(object_id: i64) -> CrmEvent {
    CrmEvent::new("deal.won", json!({ "id": object_id, "value": 500 })).with_company_id("42")
}

/// Seed a tenant mapped to company 42 with one enabled rule and one endpoint
fn seed_ruled_tenant(store: &InMemoryStore) -> i64 {
    let tenant_id = store.seed_tenant(Some("42"), None, "Acme");
    store.seed_rule(tenant_id, "deal.won", 10, None);
    store.seed_endpoint(tenant_id, "https://chat.example/general", "general", None);
    tenant_id
}

#[tokio::test]
async fn test_tier1_acceptance_touches_nothing_else() {
    let h = harness(MockWorkQueue::accepting(), MockChatSink::working());
    seed_ruled_tenant(&h.store);

    let outcome = h.system.guarantee_delivery(deal_event(1)).await;

    assert!(outcome.success);
    assert_eq!(outcome.tier, DeliveryTier::Queue);
    assert_eq!(outcome.notifications_sent, 0);
    assert_eq!(h.queue.submission_count(), 1);
    assert_eq!(h.sink.post_count(), 0);
    assert!(h.store.queue_items().is_empty());

    let logs = h.store.log_entries();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tier, "queue");
    assert_eq!(logs[0].status, "success");
}

#[tokio::test]
async fn test_queue_failure_falls_through_to_direct_send() {
    let h = harness(MockWorkQueue::unreachable(), MockChatSink::working());
    seed_ruled_tenant(&h.store);

    let outcome = h.system.guarantee_delivery(deal_event(2)).await;

    assert!(outcome.success);
    assert_eq!(outcome.tier, DeliveryTier::Direct);
    assert_eq!(outcome.notifications_sent, 1);
    assert_eq!(h.sink.post_count(), 1);
    assert_eq!(
        h.sink.posts()[0].0,
        "https://chat.example/general".to_string()
    );
    assert!(h.store.queue_items().is_empty());

    // One failed queue attempt, one direct success in the audit log
    let statuses: Vec<(String, String)> = h
        .store
        .log_entries()
        .into_iter()
        .map(|l| (l.tier, l.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("queue".to_string(), "failed".to_string()),
            ("direct".to_string(), "success".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_no_matching_rule_is_direct_success_without_sends() {
    let h = harness(MockWorkQueue::unreachable(), MockChatSink::working());
    // Tenant exists but has no rules at all
    h.store.seed_tenant(Some("42"), None, "Acme");

    let outcome = h.system.guarantee_delivery(deal_event(3)).await;

    assert!(outcome.success);
    assert_eq!(outcome.tier, DeliveryTier::Direct);
    assert_eq!(outcome.notifications_sent, 0);
    assert_eq!(h.sink.post_count(), 0);
    assert!(h.store.queue_items().is_empty());
    assert_eq!(outcome.detail, "no matching enabled rule");
}

#[tokio::test]
async fn test_sink_failure_escalates_to_batch_persistence() {
    let h = harness(MockWorkQueue::unreachable(), MockChatSink::broken());
    seed_ruled_tenant(&h.store);

    let before = Utc::now();
    let outcome = h.system.guarantee_delivery(deal_event(4)).await;

    assert!(outcome.success);
    assert_eq!(outcome.tier, DeliveryTier::Batch);
    assert_eq!(outcome.notifications_sent, 0);

    let items = h.store.queue_items();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.status, "pending");
    assert_eq!(item.tier, "batch");
    assert_eq!(item.payload["event_type"], "deal.won");
    // Default batch retry delay is five minutes
    let delay = item.scheduled_for - before;
    assert!(delay >= ChronoDuration::minutes(4) && delay <= ChronoDuration::minutes(6));
}

#[tokio::test]
async fn test_duplicate_event_is_suppressed_not_escalated() {
    let h = harness(MockWorkQueue::unreachable(), MockChatSink::working());
    seed_ruled_tenant(&h.store);

    let first = h.system.guarantee_delivery(deal_event(7)).await;
    let second = h.system.guarantee_delivery(deal_event(7)).await;

    assert!(first.success);
    assert_eq!(first.notifications_sent, 1);

    // The identical event inside the dedup window sends nothing and still
    // counts as a direct success; no batch row is created for it.
    assert!(second.success);
    assert_eq!(second.tier, DeliveryTier::Direct);
    assert_eq!(second.notifications_sent, 0);
    assert_eq!(h.sink.post_count(), 1);
    assert!(h.store.queue_items().is_empty());
}

#[tokio::test]
async fn test_unexpected_store_error_parks_for_manual_recovery() {
    let h = harness(MockWorkQueue::unreachable(), MockChatSink::working());
    seed_ruled_tenant(&h.store);
    h.store.fail_tenant_lookups.store(true, Ordering::SeqCst);

    let before = Utc::now();
    let outcome = h.system.guarantee_delivery(deal_event(5)).await;

    assert!(!outcome.success);
    assert_eq!(outcome.tier, DeliveryTier::Manual);
    assert_eq!(h.sink.post_count(), 0);

    let items = h.store.queue_items();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.status, "manual_recovery");
    assert_eq!(item.tier, "manual");
    assert!(item.error_message.is_some());
    // Default manual retry delay is one hour
    let delay = item.scheduled_for - before;
    assert!(delay >= ChronoDuration::minutes(55) && delay <= ChronoDuration::minutes(65));
}

#[tokio::test]
async fn test_fallback_file_absorbs_total_persistence_failure() {
    let fallback_path = std::env::temp_dir().join(format!(
        "relay_fallback_{}.jsonl",
        uuid::Uuid::new_v4()
    ));
    let mut config = RelayConfig::default();
    config.delivery.fallback_log_path = fallback_path.to_string_lossy().into_owned();

    let h = harness_with(config, MockWorkQueue::unreachable(), MockChatSink::working());
    h.store.fail_tenant_lookups.store(true, Ordering::SeqCst);
    h.store.fail_queue_inserts.store(true, Ordering::SeqCst);

    let outcome = h.system.guarantee_delivery(deal_event(6)).await;

    // Nothing persisted in the store, yet the caller still gets a structured
    // outcome and the event survives in the append-only fallback file.
    assert!(!outcome.success);
    assert_eq!(outcome.tier, DeliveryTier::Manual);
    assert!(h.store.queue_items().is_empty());

    let contents = std::fs::read_to_string(&fallback_path).expect("fallback file written");
    let record: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(
        record["delivery_id"],
        json!(outcome.delivery_id.to_string())
    );
    assert_eq!(record["event"]["event_type"], "deal.won");

    let _ = std::fs::remove_file(&fallback_path);
}
