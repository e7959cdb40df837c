//! # Delivery Orchestrator
//!
//! The tiered state machine guaranteeing that no event is ever silently
//! dropped:
//!
//! - **Tier 1 (queue)**: submit to the durable work queue; acceptance is
//!   success, actual delivery happens out-of-band.
//! - **Tier 2 (direct)**: only after Tier 1 failed; the synchronous
//!   end-to-end pass, successful only if a notification actually went out
//!   (or no rule matched at all).
//! - **Tier 3 (batch)**: persist the raw event for the periodic sweep.
//! - **Tier 4 (manual)**: on any unexpected error, persist a
//!   manual-recovery row; if even that write fails, append to the
//!   out-of-band fallback log — that last step never errors.
//!
//! The walk follows `DeliveryTier::next_on_failure()` edges only, every
//! attempt appends an immutable delivery-log row, and
//! [`DeliveryOrchestrator::guarantee_delivery`] always returns a structured
//! outcome to its caller.

use crate::config::DeliveryConfig;
use crate::error::RelayError;
use crate::events::CrmEvent;
use crate::messaging::{EnqueueOptions, EnqueuePriority, WorkQueue};
use crate::models::{NewDeliveryLogEntry, NewQueueItem};
use crate::orchestration::direct::DirectPipeline;
use crate::orchestration::types::{DeliveryOutcome, DirectOutcome};
use crate::state_machine::{DeliveryTier, QueueItemStatus};
use crate::store::DeliveryStore;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// How a tier attempt failed
enum TierFailure {
    /// Expected infrastructure failure; escalate along the transition table
    Escalate(String),
    /// Unexpected error; jump straight to manual recovery
    Unexpected(String),
}

/// The tiered delivery state machine
pub struct DeliveryOrchestrator {
    store: Arc<dyn DeliveryStore>,
    queue: Arc<dyn WorkQueue>,
    pipeline: Arc<DirectPipeline>,
    config: DeliveryConfig,
}

impl DeliveryOrchestrator {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        queue: Arc<dyn WorkQueue>,
        pipeline: Arc<DirectPipeline>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            queue,
            pipeline,
            config,
        }
    }

    /// Deliver an event through the tier cascade. Never returns an error
    /// and never panics outward; the outcome says what happened.
    pub async fn guarantee_delivery(&self, event: CrmEvent) -> DeliveryOutcome {
        let delivery_id = Uuid::new_v4();
        let mut tier = DeliveryTier::initial();

        loop {
            let result = match tier {
                DeliveryTier::Queue => self.attempt_queue(delivery_id, &event).await,
                DeliveryTier::Direct => self.attempt_direct(delivery_id, &event).await,
                DeliveryTier::Batch => self.attempt_batch(delivery_id, &event).await,
                DeliveryTier::Manual => return self.park_for_manual(delivery_id, &event, None).await,
            };

            match result {
                Ok(outcome) => return outcome,
                Err(TierFailure::Escalate(detail)) => {
                    self.log_attempt(delivery_id, tier, "failed", json!({ "error": detail }))
                        .await;
                    match tier.next_on_failure() {
                        Some(next) => {
                            info!(
                                delivery_id = %delivery_id,
                                from = %tier,
                                to = %next,
                                "Escalating delivery tier"
                            );
                            tier = next;
                        }
                        None => {
                            // Unreachable by construction: batch and manual
                            // attempts fail as Unexpected, not Escalate.
                            return self.park_for_manual(delivery_id, &event, Some(detail)).await;
                        }
                    }
                }
                Err(TierFailure::Unexpected(detail)) => {
                    crate::logging::log_error(
                        "orchestrator",
                        "guarantee_delivery",
                        &detail,
                        Some(&format!(
                            "delivery {delivery_id} at {tier} tier; parking for manual recovery"
                        )),
                    );
                    self.log_attempt(delivery_id, tier, "error", json!({ "error": detail }))
                        .await;
                    return self.park_for_manual(delivery_id, &event, Some(detail)).await;
                }
            }
        }
    }

    /// Tier 1: hand the event to the durable work queue
    async fn attempt_queue(
        &self,
        delivery_id: Uuid,
        event: &CrmEvent,
    ) -> Result<DeliveryOutcome, TierFailure> {
        let options = EnqueueOptions {
            priority: EnqueuePriority::Normal,
            delay_seconds: 0,
            max_attempts: self.config.queue_max_attempts,
            ..Default::default()
        };

        let timeout = Duration::from_millis(self.config.queue_timeout_ms);
        match tokio::time::timeout(timeout, self.queue.enqueue(event, options)).await {
            Ok(Ok(handle)) => {
                self.log_attempt(
                    delivery_id,
                    DeliveryTier::Queue,
                    "success",
                    json!({
                        "message_id": handle.message_id,
                        "queue": handle.queue_name,
                        "company_id": event.company_id,
                    }),
                )
                .await;
                Ok(DeliveryOutcome::new(
                    true,
                    DeliveryTier::Queue,
                    delivery_id,
                    0,
                    format!("accepted by queue as message {}", handle.message_id),
                ))
            }
            Ok(Err(e)) => Err(TierFailure::Escalate(e.to_string())),
            Err(_) => Err(TierFailure::Escalate(
                RelayError::timeout("queue submission", self.config.queue_timeout_ms).to_string(),
            )),
        }
    }

    /// Tier 2: synchronous end-to-end delivery
    async fn attempt_direct(
        &self,
        delivery_id: Uuid,
        event: &CrmEvent,
    ) -> Result<DeliveryOutcome, TierFailure> {
        match self.pipeline.deliver(event).await {
            Ok(outcome) if outcome.succeeded() => {
                self.log_attempt(
                    delivery_id,
                    DeliveryTier::Direct,
                    "success",
                    direct_result_json(&outcome),
                )
                .await;
                let detail = if outcome.matched_rules == 0 {
                    "no matching enabled rule".to_string()
                } else {
                    format!("{} notification(s) sent", outcome.notifications_sent)
                };
                Ok(DeliveryOutcome::new(
                    true,
                    DeliveryTier::Direct,
                    delivery_id,
                    outcome.notifications_sent,
                    detail,
                ))
            }
            Ok(outcome) => Err(TierFailure::Escalate(format!(
                "direct delivery sent 0 of {} matched rule(s)",
                outcome.matched_rules
            ))),
            // A tenant we cannot resolve now may resolve once mappings heal;
            // the batch tier will retry it.
            Err(RelayError::NoTenantFound { company_id }) => Err(TierFailure::Escalate(format!(
                "no tenant found for company {company_id}"
            ))),
            Err(e) => Err(TierFailure::Unexpected(e.to_string())),
        }
    }

    /// Tier 3: persist for the periodic batch sweep
    async fn attempt_batch(
        &self,
        delivery_id: Uuid,
        event: &CrmEvent,
    ) -> Result<DeliveryOutcome, TierFailure> {
        let scheduled_for =
            Utc::now() + ChronoDuration::minutes(self.config.batch_retry_delay_minutes);
        let item = NewQueueItem {
            delivery_id,
            tenant_id: None,
            payload: serde_json::to_value(event)
                .map_err(|e| TierFailure::Unexpected(e.to_string()))?,
            status: QueueItemStatus::Pending,
            tier: DeliveryTier::Batch,
            scheduled_for,
            error_message: None,
        };

        match self.store.insert_queue_item(item).await {
            Ok(_) => {
                self.log_attempt(
                    delivery_id,
                    DeliveryTier::Batch,
                    "scheduled",
                    json!({
                        "scheduled_for": scheduled_for,
                        "company_id": event.company_id,
                    }),
                )
                .await;
                Ok(DeliveryOutcome::new(
                    true,
                    DeliveryTier::Batch,
                    delivery_id,
                    0,
                    format!("scheduled for batch retry at {scheduled_for}"),
                ))
            }
            Err(e) => Err(TierFailure::Unexpected(e.to_string())),
        }
    }

    /// Tier 4: park for manual recovery; the absolute last resort is the
    /// append-only fallback file, and nothing in here can fail outward
    async fn park_for_manual(
        &self,
        delivery_id: Uuid,
        event: &CrmEvent,
        error_detail: Option<String>,
    ) -> DeliveryOutcome {
        let scheduled_for =
            Utc::now() + ChronoDuration::minutes(self.config.manual_retry_delay_minutes);
        let payload = serde_json::to_value(event).unwrap_or_else(|_| json!(null));
        let item = NewQueueItem {
            delivery_id,
            tenant_id: None,
            payload,
            status: QueueItemStatus::ManualRecovery,
            tier: DeliveryTier::Manual,
            scheduled_for,
            error_message: error_detail.clone(),
        };

        match self.store.insert_queue_item(item).await {
            Ok(_) => {
                self.log_attempt(
                    delivery_id,
                    DeliveryTier::Manual,
                    "parked",
                    json!({ "scheduled_for": scheduled_for, "error": error_detail }),
                )
                .await;
            }
            Err(e) => {
                crate::logging::log_error(
                    "orchestrator",
                    "park_for_manual",
                    &e.to_string(),
                    Some(&format!("delivery {delivery_id}; writing fallback log")),
                );
                self.write_fallback_record(delivery_id, event, &e.to_string());
            }
        }

        DeliveryOutcome::new(
            false,
            DeliveryTier::Manual,
            delivery_id,
            0,
            error_detail.unwrap_or_else(|| "parked for manual recovery".to_string()),
        )
    }

    /// Append one JSONL record to the out-of-band fallback file. Best
    /// effort only: every failure path here is swallowed.
    fn write_fallback_record(&self, delivery_id: Uuid, event: &CrmEvent, error: &str) {
        let record = json!({
            "delivery_id": delivery_id,
            "event": event,
            "error": error,
            "recorded_at": Utc::now(),
        });

        let path = std::path::Path::new(&self.config.fallback_log_path);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(mut file) = std::fs::OpenOptions::new().append(true).create(true).open(path) {
            let _ = writeln!(file, "{record}");
        }
    }

    /// Append an immutable audit row; audit failures are logged, never raised
    async fn log_attempt(
        &self,
        delivery_id: Uuid,
        tier: DeliveryTier,
        status: &str,
        result: serde_json::Value,
    ) {
        crate::logging::log_delivery_operation(
            "tier_attempt",
            Some(&delivery_id.to_string()),
            result.get("tenant_id").and_then(|t| t.as_i64()),
            Some(&tier.to_string()),
            status,
            None,
        );
        let entry = NewDeliveryLogEntry {
            delivery_id,
            tier: tier.to_string(),
            status: status.to_string(),
            result: Some(result),
        };
        if let Err(e) = self.store.append_delivery_log(entry).await {
            warn!(
                delivery_id = %delivery_id,
                tier = %tier,
                error = %e,
                "Failed to append delivery log entry"
            );
        }
    }
}

fn direct_result_json(outcome: &DirectOutcome) -> serde_json::Value {
    json!({
        "tenant_id": outcome.tenant_id,
        "company_id": outcome.company_id,
        "matched_rules": outcome.matched_rules,
        "notifications_sent": outcome.notifications_sent,
        "suppressed_duplicates": outcome.suppressed_duplicates,
        "filtered_out": outcome.filtered_out,
        "send_failures": outcome.send_failures,
    })
}
