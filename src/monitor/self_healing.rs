//! # Self-Healing Monitor
//!
//! The autonomous watchdog. Each run performs five independent checks;
//! a check that errors is captured as a critical issue without aborting
//! the others, and the run always returns a structured [`HealthReport`].
//!
//! The checks:
//! a. queue health - bulk-requeue failed items under the retry cap when the
//!    trailing failure count crosses the threshold; reschedule stuck rows
//! b. tenant-mapping integrity - majority-vote auto-mapping; conflicting
//!    mappings (shared user ids, votes for claimed company ids) flagged
//!    for manual action, never merged
//! c. delivery performance - success rate / latency over the trailing
//!    window; drains overdue batch backlog through the sweeper
//! d. storage hygiene - bounded retention purge; malformed rows failed
//! e. endpoint sampling - active-endpoint count only, no live probe
//!
//! The emergency variant performs only the highest-value fixes
//! synchronously, for operator-triggered recovery.

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::monitor::report::{
    CheckFindings, EmergencyReport, HealthIssue, HealthReport, RetryReport,
};
use crate::orchestration::BatchSweeper;
use crate::resolver::MajorityVoteStrategy;
use crate::store::DeliveryStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The periodic watchdog over store state
pub struct SelfHealingMonitor {
    store: Arc<dyn DeliveryStore>,
    sweeper: Arc<BatchSweeper>,
    config: MonitorConfig,
    max_auto_retries: i32,
    vote: MajorityVoteStrategy,
}

impl SelfHealingMonitor {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        sweeper: Arc<BatchSweeper>,
        config: MonitorConfig,
        max_auto_retries: i32,
    ) -> Self {
        Self {
            store,
            sweeper,
            config,
            max_auto_retries,
            vote: MajorityVoteStrategy::default(),
        }
    }

    /// One full watchdog run. Never returns an error; check failures become
    /// critical issues in the report.
    pub async fn run_health_check(&self) -> HealthReport {
        let mut report = HealthReport::new();

        let checks: [(&str, Result<CheckFindings>); 5] = [
            ("queue_health", self.check_queue_health().await),
            ("tenant_mapping", self.check_tenant_mapping().await),
            ("delivery_performance", self.check_delivery_performance().await),
            ("storage_hygiene", self.check_storage_hygiene().await),
            ("endpoint_sampling", self.check_endpoint_sampling().await),
        ];

        for (name, result) in checks {
            match result {
                Ok(findings) => {
                    crate::logging::log_monitor_operation(
                        name,
                        "ok",
                        findings.auto_fixes.len(),
                        None,
                    );
                    report.absorb(findings);
                }
                Err(e) => {
                    warn!(check = name, error = %e, "Health check failed");
                    report.absorb(CheckFindings {
                        issues: vec![HealthIssue::critical(name, format!("check failed: {e}"))],
                        ..Default::default()
                    });
                }
            }
        }

        info!(
            healthy = report.healthy,
            issues = report.issues.len(),
            auto_fixes = report.auto_fixes.len(),
            manual_actions = report.manual_actions.len(),
            "🩺 Self-healing run complete"
        );
        report
    }

    /// Operator-triggered synchronous recovery: retry all recent failures,
    /// requeue every due manual-recovery row, drain every due replayable
    /// row, release stale claims. Never throws.
    pub async fn run_emergency_heal(&self) -> EmergencyReport {
        let mut errors = Vec::new();

        let requeued = match self
            .store
            .requeue_failed(self.max_auto_retries, i64::MAX)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                errors.push(format!("requeue failed items: {e}"));
                0
            }
        };

        let requeued_manual = match self.store.requeue_due_manual(i64::MAX).await {
            Ok(n) => n,
            Err(e) => {
                errors.push(format!("requeue manual-recovery items: {e}"));
                0
            }
        };

        let drained = self.sweeper.drain().await;

        let released = match self
            .store
            .release_stale_processing(self.config.stale_lock_minutes)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                errors.push(format!("release stale locks: {e}"));
                0
            }
        };

        info!(
            requeued = requeued,
            requeued_manual = requeued_manual,
            drained = drained.claimed,
            released = released,
            "🚑 Emergency heal complete"
        );

        EmergencyReport {
            requeued_failures: requeued,
            requeued_manual,
            drained_batch_items: drained.claimed,
            released_stale_locks: released,
            errors,
            healed_at: Utc::now(),
        }
    }

    /// Operator-triggered bounded retry of failed and due manual-recovery
    /// rows; the sweep replays what this requeues
    pub async fn retry_failed(&self, limit: i64) -> RetryReport {
        let requeued = match self.store.requeue_failed(self.max_auto_retries, limit).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "retry_failed could not requeue");
                0
            }
        };
        let requeued_manual = match self.store.requeue_due_manual(limit).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "retry_failed could not requeue manual-recovery rows");
                0
            }
        };
        RetryReport {
            requeued,
            requeued_manual,
            limit,
        }
    }

    /// Spawn the periodic health check. The caller owns the handle.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let interval = monitor.config.interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                monitor.run_health_check().await;
            }
        })
    }

    /// Check a: failure backlog and stuck pending rows
    async fn check_queue_health(&self) -> Result<CheckFindings> {
        let mut findings = CheckFindings::default();

        let failed = self
            .store
            .count_failed_since(self.config.trailing_window_hours)
            .await?;
        if failed > self.config.failed_threshold {
            findings.issues.push(HealthIssue::warning(
                "queue_health",
                format!(
                    "{failed} failed items in the last {}h (threshold {})",
                    self.config.trailing_window_hours, self.config.failed_threshold
                ),
            ));
            let requeued = self.store.requeue_failed(self.max_auto_retries, failed).await?;
            if requeued > 0 {
                findings
                    .auto_fixes
                    .push(format!("requeued {requeued} failed items under the retry cap"));
            }
            let capped = failed - requeued as i64;
            if capped > 0 {
                findings.manual_actions.push(format!(
                    "{capped} failed items exhausted their {} auto-retries",
                    self.max_auto_retries
                ));
            }
        }

        let rescheduled = self
            .store
            .reschedule_stuck_pending(self.config.stuck_pending_max_age_minutes)
            .await?;
        if rescheduled > 0 {
            findings.auto_fixes.push(format!(
                "rescheduled {rescheduled} pending items stuck past {} minutes",
                self.config.stuck_pending_max_age_minutes
            ));
        }

        Ok(findings)
    }

    /// Check b: unmapped ruled tenants and conflicting mappings
    async fn check_tenant_mapping(&self) -> Result<CheckFindings> {
        let mut findings = CheckFindings::default();

        for tenant in self.store.unmapped_tenants_with_rules().await? {
            match self
                .vote
                .winning_company_id(self.store.as_ref(), tenant.tenant_id)
                .await?
            {
                Some(company_id) => {
                    if self
                        .store
                        .bind_company_id(tenant.tenant_id, &company_id)
                        .await?
                    {
                        findings.auto_fixes.push(format!(
                            "auto-mapped tenant {} to company {company_id} by log majority",
                            tenant.tenant_id
                        ));
                    } else {
                        findings.manual_actions.push(format!(
                            "tenant {} voted for company {company_id} but the mapping is taken",
                            tenant.tenant_id
                        ));
                    }
                }
                None => {
                    findings.issues.push(HealthIssue::warning(
                        "tenant_mapping",
                        format!(
                            "tenant {} has enabled rules but no company mapping and no log majority",
                            tenant.tenant_id
                        ),
                    ));
                }
            }
        }

        // Conflicts are reported, never merged
        for shared in self.store.shared_user_mappings().await? {
            findings.manual_actions.push(format!(
                "user {} is mapped to tenants {:?}; consolidate manually",
                shared.external_user_id, shared.tenant_ids
            ));
        }

        Ok(findings)
    }

    /// Check c: success rate, latency, and overdue batch backlog
    async fn check_delivery_performance(&self) -> Result<CheckFindings> {
        let mut findings = CheckFindings::default();

        let stats = self
            .store
            .delivery_stats(self.config.trailing_window_hours)
            .await?;
        if stats.total_deliveries > 0 && stats.success_rate < self.config.success_rate_floor {
            findings.issues.push(HealthIssue::warning(
                "delivery_performance",
                format!(
                    "success rate {:.1}% below {:.1}% floor over {}h",
                    stats.success_rate * 100.0,
                    self.config.success_rate_floor * 100.0,
                    stats.window_hours
                ),
            ));
        }
        if stats.avg_latency_ms > self.config.latency_threshold_ms {
            findings.issues.push(HealthIssue::warning(
                "delivery_performance",
                format!(
                    "average delivery latency {:.0}ms above {:.0}ms threshold",
                    stats.avg_latency_ms, self.config.latency_threshold_ms
                ),
            ));
        }

        let backlog = self
            .store
            .count_batch_backlog(self.config.backlog_drain_age_minutes)
            .await?;
        if backlog > 0 {
            findings.issues.push(HealthIssue::warning(
                "delivery_performance",
                format!(
                    "{backlog} batch items overdue by more than {} minutes",
                    self.config.backlog_drain_age_minutes
                ),
            ));
            let drained = self.sweeper.drain().await;
            findings.auto_fixes.push(format!(
                "drained batch backlog: {} replayed, {} completed, {} failed",
                drained.claimed, drained.completed, drained.failed
            ));
        }

        Ok(findings)
    }

    /// Check d: retention purge and malformed rows
    async fn check_storage_hygiene(&self) -> Result<CheckFindings> {
        let mut findings = CheckFindings::default();

        let purged = self
            .store
            .purge_delivery_logs(
                self.config.log_retention_days,
                self.config.retention_batch_size,
            )
            .await?;
        if purged > 0 {
            findings.auto_fixes.push(format!(
                "purged {purged} delivery-log rows past {}d retention",
                self.config.log_retention_days
            ));
        }

        let malformed = self.store.mark_malformed_failed().await?;
        if malformed > 0 {
            findings.issues.push(HealthIssue::warning(
                "storage_hygiene",
                format!("{malformed} malformed queue rows found"),
            ));
            findings.auto_fixes.push(format!(
                "marked {malformed} malformed queue rows failed to stop blind retries"
            ));
        }

        Ok(findings)
    }

    /// Check e: active-endpoint sample count
    async fn check_endpoint_sampling(&self) -> Result<CheckFindings> {
        let mut findings = CheckFindings::default();

        let active = self
            .store
            .count_active_endpoints_sample(self.config.endpoint_sample_size)
            .await?;
        if active == 0 {
            findings.issues.push(HealthIssue::warning(
                "endpoint_sampling",
                "no active endpoints found in sample".to_string(),
            ));
        } else {
            findings.issues.push(HealthIssue::info(
                "endpoint_sampling",
                format!("{active} active endpoints in sample"),
            ));
        }

        Ok(findings)
    }
}
