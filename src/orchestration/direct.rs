//! # Direct Delivery Pipeline
//!
//! The synchronous end-to-end path: resolve tenant, match rules, suppress
//! duplicates, evaluate filters, route, send. The orchestrator runs it as
//! Tier 2 and the batch sweeper replays persisted events through it.
//!
//! Every outbound send carries a timeout; a timed-out send counts as a
//! failure for that rule and the pass moves on to the next one.

use crate::config::{DeliveryConfig, FilterPolicy};
use crate::dedup::{DedupKey, Deduplicator};
use crate::error::Result;
use crate::events::CrmEvent;
use crate::matcher;
use crate::orchestration::types::DirectOutcome;
use crate::resolver::TenantResolver;
use crate::router;
use crate::sink::{ChatSink, RenderedMessage};
use crate::store::DeliveryStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// The resolve -> match -> dedup -> filter -> route -> send pipeline
pub struct DirectPipeline {
    store: Arc<dyn DeliveryStore>,
    sink: Arc<dyn ChatSink>,
    dedup: Arc<Deduplicator>,
    resolver: TenantResolver,
    filter_policy: FilterPolicy,
    send_timeout: Duration,
}

impl DirectPipeline {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        sink: Arc<dyn ChatSink>,
        dedup: Arc<Deduplicator>,
        resolver: TenantResolver,
        filter_policy: FilterPolicy,
        delivery: &DeliveryConfig,
    ) -> Self {
        Self {
            store,
            sink,
            dedup,
            resolver,
            filter_policy,
            send_timeout: Duration::from_millis(delivery.send_timeout_ms),
        }
    }

    /// Run the full pass for one event
    pub async fn deliver(&self, event: &CrmEvent) -> Result<DirectOutcome> {
        let tenant = self.resolver.resolve(event).await?;

        let mut outcome = DirectOutcome {
            tenant_id: Some(tenant.tenant_id),
            company_id: event.company_id.clone(),
            ..Default::default()
        };

        let rules = matcher::find_rules(self.store.as_ref(), tenant.tenant_id, &event.event_type)
            .await?;
        outcome.matched_rules = rules.len();
        if rules.is_empty() {
            debug!(
                tenant_id = tenant.tenant_id,
                event_type = %event.event_type,
                "No matching enabled rule; nothing to send"
            );
            return Ok(outcome);
        }

        let endpoints = self.store.active_endpoints(tenant.tenant_id).await?;
        let object_id = event.object_id().unwrap_or_default();

        for rule in &rules {
            if !matcher::applies_to(rule, event, self.filter_policy.fail_open) {
                outcome.filtered_out += 1;
                continue;
            }

            let key = DedupKey {
                tenant_id: tenant.tenant_id,
                rule_id: rule.rule_id,
                object_id: object_id.clone(),
                event_type: event.event_type.clone(),
            };
            if !self.dedup.check_and_record(key) {
                debug!(
                    rule_id = rule.rule_id,
                    object_id = %object_id,
                    "Suppressed duplicate send inside dedup window"
                );
                outcome.suppressed_duplicates += 1;
                continue;
            }

            let Some(endpoint) = router::route(event, rule, &endpoints) else {
                warn!(
                    tenant_id = tenant.tenant_id,
                    rule_id = rule.rule_id,
                    "No routable endpoint for matched rule"
                );
                outcome.send_failures += 1;
                continue;
            };

            let message = render_stub(event, &rule.render_mode);
            match tokio::time::timeout(
                self.send_timeout,
                self.sink.post(&endpoint.address, &message),
            )
            .await
            {
                Ok(Ok(_ack)) => {
                    outcome.notifications_sent += 1;
                }
                Ok(Err(e)) => {
                    warn!(
                        endpoint_id = endpoint.endpoint_id,
                        error = %e,
                        "Chat send failed"
                    );
                    outcome.send_failures += 1;
                }
                Err(_) => {
                    warn!(
                        endpoint_id = endpoint.endpoint_id,
                        timeout_ms = self.send_timeout.as_millis() as u64,
                        "Chat send timed out"
                    );
                    outcome.send_failures += 1;
                }
            }
        }

        Ok(outcome)
    }
}

/// Message rendering lives outside the core; the pipeline forwards the raw
/// event under the rule's rendering mode and lets the endpoint-side renderer
/// do substitution.
fn render_stub(event: &CrmEvent, render_mode: &str) -> RenderedMessage {
    RenderedMessage::new(
        render_mode,
        json!({
            "event_type": event.event_type,
            "object": event.object,
            "occurred_at": event.occurred_at,
        }),
    )
}
