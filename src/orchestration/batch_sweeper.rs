//! # Batch Sweeper
//!
//! Replays persisted queue items through the direct pipeline: batch-tier
//! rows plus manual-recovery rows an operator requeued. Each run claims one
//! bounded page of due rows (pending -> processing, conditional,
//! skip-locked), so a concurrent sweep or the watchdog can never
//! double-process a row, and per-run work is capped.

use crate::models::NewDeliveryLogEntry;
use crate::orchestration::direct::DirectPipeline;
use crate::orchestration::types::SweepReport;
use crate::store::DeliveryStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Periodic replayer for Tier-3 rows
pub struct BatchSweeper {
    store: Arc<dyn DeliveryStore>,
    pipeline: Arc<DirectPipeline>,
    page_size: i64,
}

impl BatchSweeper {
    pub fn new(store: Arc<dyn DeliveryStore>, pipeline: Arc<DirectPipeline>, page_size: i64) -> Self {
        Self {
            store,
            pipeline,
            page_size,
        }
    }

    /// Claim and replay one page of due rows
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let items = match self.store.claim_due_batch_items(self.page_size).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Batch sweep could not claim due rows");
                return report;
            }
        };
        report.claimed = items.len();
        if items.is_empty() {
            return report;
        }

        info!(claimed = report.claimed, "🔁 Batch sweep replaying due rows");

        for item in items {
            let event = match serde_json::from_value(item.payload.clone()) {
                Ok(event) => event,
                Err(e) => {
                    self.fail_item(&item, &format!("unreplayable payload: {e}")).await;
                    report.failed += 1;
                    continue;
                }
            };

            match self.pipeline.deliver(&event).await {
                Ok(outcome) if outcome.succeeded() => {
                    if let Err(e) = self.store.complete_queue_item(item.delivery_id).await {
                        warn!(delivery_id = %item.delivery_id, error = %e, "Failed to mark row completed");
                    }
                    self.log_replay(
                        item.delivery_id,
                        &item.tier,
                        "success",
                        outcome.notifications_sent,
                    )
                    .await;
                    report.completed += 1;
                }
                Ok(outcome) => {
                    self.fail_item(
                        &item,
                        &format!(
                            "replay sent 0 of {} matched rule(s)",
                            outcome.matched_rules
                        ),
                    )
                    .await;
                    report.failed += 1;
                }
                Err(e) => {
                    self.fail_item(&item, &e.to_string()).await;
                    report.failed += 1;
                }
            }
        }

        info!(
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            "✅ Batch sweep finished"
        );
        report
    }

    /// Run pages until no due row remains (emergency drain)
    pub async fn drain(&self) -> SweepReport {
        let mut total = SweepReport::default();
        loop {
            let report = self.run_once().await;
            if report.claimed == 0 {
                break;
            }
            total.merge(&report);
        }
        total
    }

    /// Spawn the periodic sweep. The caller owns the handle.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                sweeper.run_once().await;
            }
        })
    }

    async fn fail_item(&self, item: &crate::models::QueueItem, error: &str) {
        if let Err(e) = self.store.fail_queue_item(item.delivery_id, error).await {
            warn!(delivery_id = %item.delivery_id, error = %e, "Failed to mark row failed");
        }
        self.log_replay(item.delivery_id, &item.tier, "failed", 0).await;
    }

    async fn log_replay(&self, delivery_id: uuid::Uuid, tier: &str, status: &str, sent: usize) {
        let entry = NewDeliveryLogEntry {
            delivery_id,
            tier: tier.to_string(),
            status: status.to_string(),
            result: Some(json!({ "notifications_sent": sent, "replay": true })),
        };
        if let Err(e) = self.store.append_delivery_log(entry).await {
            warn!(delivery_id = %delivery_id, error = %e, "Failed to append replay log entry");
        }
    }
}
