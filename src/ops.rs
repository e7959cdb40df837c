//! # Operational Surface
//!
//! Library-level facade wiring the whole delivery core together: store,
//! work queue, chat sink, deduplicator, resolver, orchestrator, sweeper,
//! and watchdog. Every operation returns a structured report; none returns
//! an exit code and none throws to the caller.

use crate::config::RelayConfig;
use crate::dedup::Deduplicator;
use crate::error::{RelayError, Result};
use crate::events::CrmEvent;
use crate::matcher::alias;
use crate::messaging::{PgmqWorkQueue, WorkQueue};
use crate::monitor::{DeliveryStats, EmergencyReport, HealthReport, RetryReport, SelfHealingMonitor};
use crate::orchestration::{BatchSweeper, DeliveryOrchestrator, DeliveryOutcome, DirectPipeline};
use crate::resolver::TenantResolver;
use crate::sink::{ChatSink, HttpChatSink};
use crate::store::{DeliveryStore, PgDeliveryStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The assembled delivery core
pub struct RelaySystem {
    config: RelayConfig,
    store: Arc<dyn DeliveryStore>,
    orchestrator: Arc<DeliveryOrchestrator>,
    sweeper: Arc<BatchSweeper>,
    monitor: Arc<SelfHealingMonitor>,
    dedup: Arc<Deduplicator>,
    background: Vec<JoinHandle<()>>,
}

impl RelaySystem {
    /// Bootstrap against Postgres and pgmq using the given configuration
    pub async fn bootstrap(config: RelayConfig) -> Result<Self> {
        alias::validate().map_err(|e| RelayError::configuration("alias_table", e))?;

        info!("🚀 Bootstrapping relay delivery core");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let store: Arc<dyn DeliveryStore> = Arc::new(PgDeliveryStore::new(pool.clone()));
        let queue: Arc<dyn WorkQueue> = Arc::new(
            PgmqWorkQueue::new_with_pool(pool, &config.delivery.queue_name)
                .await
                .map_err(|e| RelayError::queue(e.to_string()))?,
        );
        let sink: Arc<dyn ChatSink> = Arc::new(HttpChatSink::new(Duration::from_millis(
            config.delivery.send_timeout_ms,
        )));

        Ok(Self::assemble(config, store, queue, sink))
    }

    /// Assemble from injected seams (tests, alternative backends)
    pub fn assemble(
        config: RelayConfig,
        store: Arc<dyn DeliveryStore>,
        queue: Arc<dyn WorkQueue>,
        sink: Arc<dyn ChatSink>,
    ) -> Self {
        let dedup = Arc::new(Deduplicator::new(config.dedup.ttl()));
        let resolver = TenantResolver::new(Arc::clone(&store));
        let pipeline = Arc::new(DirectPipeline::new(
            Arc::clone(&store),
            sink,
            Arc::clone(&dedup),
            resolver,
            config.filter.clone(),
            &config.delivery,
        ));
        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            Arc::clone(&store),
            queue,
            Arc::clone(&pipeline),
            config.delivery.clone(),
        ));
        let sweeper = Arc::new(BatchSweeper::new(
            Arc::clone(&store),
            pipeline,
            config.delivery.batch_page_size,
        ));
        let monitor = Arc::new(SelfHealingMonitor::new(
            Arc::clone(&store),
            Arc::clone(&sweeper),
            config.monitor.clone(),
            config.delivery.max_auto_retries,
        ));

        Self {
            config,
            store,
            orchestrator,
            sweeper,
            monitor,
            dedup,
            background: Vec::new(),
        }
    }

    /// Start the owned background tasks: dedup eviction, the periodic batch
    /// sweep, and the watchdog
    pub fn start_background_tasks(&mut self) {
        let eviction = self
            .dedup
            .spawn_eviction(self.config.dedup.eviction_interval());
        let sweep = self.sweeper.spawn(Duration::from_secs(
            self.config.delivery.batch_retry_delay_minutes as u64 * 60,
        ));
        let watchdog = self.monitor.spawn();
        self.background.extend([eviction, sweep, watchdog]);
        info!("✅ Background tasks started (eviction, sweep, watchdog)");
    }

    /// Deliver one inbound event; always returns a structured outcome
    pub async fn guarantee_delivery(&self, event: CrmEvent) -> DeliveryOutcome {
        self.orchestrator.guarantee_delivery(event).await
    }

    /// Run the watchdog once, on demand
    pub async fn run_health_check(&self) -> HealthReport {
        self.monitor.run_health_check().await
    }

    /// Operator-triggered synchronous recovery
    pub async fn run_emergency_heal(&self) -> EmergencyReport {
        self.monitor.run_emergency_heal().await
    }

    /// Requeue up to `limit` failed items under the retry cap, plus due
    /// manual-recovery rows; the sweep replays what this requeues
    pub async fn retry_failed(&self, limit: i64) -> RetryReport {
        self.monitor.retry_failed(limit).await
    }

    /// Delivery statistics over a trailing window
    pub async fn get_delivery_stats(&self, hours: i64) -> DeliveryStats {
        match self.store.delivery_stats(hours).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Could not compute delivery stats");
                DeliveryStats {
                    window_hours: hours,
                    total_deliveries: 0,
                    successful_deliveries: 0,
                    success_rate: 0.0,
                    avg_latency_ms: 0.0,
                }
            }
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

impl Drop for RelaySystem {
    fn drop(&mut self) {
        for handle in &self.background {
            handle.abort();
        }
    }
}
