//! # Configuration
//!
//! Runtime configuration for the delivery core. Every tunable the pipeline
//! and the watchdog consult lives here, with defaults matching production
//! behavior and environment-variable overrides for deployment.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the delivery core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub database_url: String,
    pub dedup: DedupConfig,
    pub delivery: DeliveryConfig,
    pub monitor: MonitorConfig,
    pub filter: FilterPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/relay_development".to_string(),
            dedup: DedupConfig::default(),
            delivery: DeliveryConfig::default(),
            monitor: MonitorConfig::default(),
            filter: FilterPolicy::default(),
        }
    }
}

/// Duplicate-suppression window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long an identical (tenant, rule, object, event type) send is suppressed
    pub ttl_seconds: u64,
    /// Background eviction sweep interval
    pub eviction_interval_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300, // 5 minutes
            eviction_interval_seconds: 60,
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_seconds)
    }
}

/// Tiered-delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// pgmq queue name for Tier-1 submissions
    pub queue_name: String,
    /// Max delivery attempts hint passed to the work queue
    pub queue_max_attempts: i32,
    /// Timeout for a single queue submission
    pub queue_timeout_ms: u64,
    /// Timeout for a single chat endpoint send
    pub send_timeout_ms: u64,
    /// Delay before a batch-tier row becomes due
    pub batch_retry_delay_minutes: i64,
    /// Delay before a manual-recovery row becomes due
    pub manual_retry_delay_minutes: i64,
    /// Rows claimed per batch sweep run
    pub batch_page_size: i64,
    /// Cap on the failed -> pending retry edge per item
    pub max_auto_retries: i32,
    /// Path of the append-only last-resort log used when Tier-4 persistence fails
    pub fallback_log_path: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_name: "relay_deliveries".to_string(),
            queue_max_attempts: 3,
            queue_timeout_ms: 5_000,
            send_timeout_ms: 10_000,
            batch_retry_delay_minutes: 5,
            manual_retry_delay_minutes: 60,
            batch_page_size: 50,
            max_auto_retries: 3,
            fallback_log_path: "log/manual_recovery_fallback.jsonl".to_string(),
        }
    }
}

/// Self-healing watchdog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Health-check cadence
    pub interval_minutes: u64,
    /// Trailing window for failure counting and delivery stats
    pub trailing_window_hours: i64,
    /// Failed-item count that triggers a bulk requeue
    pub failed_threshold: i64,
    /// Pending items older than this are rescheduled
    pub stuck_pending_max_age_minutes: i64,
    /// Success rate below this is flagged
    pub success_rate_floor: f64,
    /// Average delivery latency above this is flagged
    pub latency_threshold_ms: f64,
    /// Batch rows older than this are drained immediately
    pub backlog_drain_age_minutes: i64,
    /// Delivery-log retention horizon
    pub log_retention_days: i64,
    /// Rows purged per retention pass
    pub retention_batch_size: i64,
    /// In-process claims older than this are released by emergency heal
    pub stale_lock_minutes: i64,
    /// Endpoint rows inspected by the sampling check
    pub endpoint_sample_size: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            trailing_window_hours: 24,
            failed_threshold: 50,
            stuck_pending_max_age_minutes: 60,
            success_rate_floor: 0.95,
            latency_threshold_ms: 30_000.0,
            backlog_drain_age_minutes: 10,
            log_retention_days: 30,
            retention_batch_size: 1_000,
            stale_lock_minutes: 30,
            endpoint_sample_size: 25,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// Filter-evaluation policy
///
/// `fail_open` preserves the historical behavior of treating an unparsable
/// filter configuration as a match (notify) rather than a reject. Flip it to
/// tighten the pipeline without touching matching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPolicy {
    pub fail_open: bool,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self { fail_open: true }
    }
}

impl RelayConfig {
    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(ttl) = std::env::var("RELAY_DEDUP_TTL_SECONDS") {
            config.dedup.ttl_seconds = ttl.parse().map_err(|e| {
                RelayError::configuration("dedup", format!("invalid ttl_seconds: {e}"))
            })?;
        }

        if let Ok(queue_name) = std::env::var("RELAY_QUEUE_NAME") {
            config.delivery.queue_name = queue_name;
        }

        if let Ok(max_retries) = std::env::var("RELAY_MAX_AUTO_RETRIES") {
            config.delivery.max_auto_retries = max_retries.parse().map_err(|e| {
                RelayError::configuration("delivery", format!("invalid max_auto_retries: {e}"))
            })?;
        }

        if let Ok(page_size) = std::env::var("RELAY_BATCH_PAGE_SIZE") {
            config.delivery.batch_page_size = page_size.parse().map_err(|e| {
                RelayError::configuration("delivery", format!("invalid batch_page_size: {e}"))
            })?;
        }

        if let Ok(threshold) = std::env::var("RELAY_FAILED_THRESHOLD") {
            config.monitor.failed_threshold = threshold.parse().map_err(|e| {
                RelayError::configuration("monitor", format!("invalid failed_threshold: {e}"))
            })?;
        }

        if let Ok(interval) = std::env::var("RELAY_MONITOR_INTERVAL_MINUTES") {
            config.monitor.interval_minutes = interval.parse().map_err(|e| {
                RelayError::configuration("monitor", format!("invalid interval_minutes: {e}"))
            })?;
        }

        if let Ok(fail_open) = std::env::var("RELAY_FILTER_FAIL_OPEN") {
            config.filter.fail_open = fail_open.parse().map_err(|e| {
                RelayError::configuration("filter", format!("invalid fail_open: {e}"))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_constants() {
        let config = RelayConfig::default();
        assert_eq!(config.dedup.ttl_seconds, 300);
        assert_eq!(config.delivery.batch_retry_delay_minutes, 5);
        assert_eq!(config.delivery.manual_retry_delay_minutes, 60);
        assert_eq!(config.delivery.batch_page_size, 50);
        assert_eq!(config.delivery.max_auto_retries, 3);
        assert_eq!(config.monitor.failed_threshold, 50);
        assert_eq!(config.monitor.interval_minutes, 5);
        assert_eq!(config.monitor.stale_lock_minutes, 30);
        assert_eq!(config.monitor.backlog_drain_age_minutes, 10);
        assert!(config.filter.fail_open);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("RELAY_MAX_AUTO_RETRIES", "7");
        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.delivery.max_auto_retries, 7);
        std::env::remove_var("RELAY_MAX_AUTO_RETRIES");
    }

    #[test]
    fn test_invalid_env_value_is_configuration_error() {
        std::env::set_var("RELAY_FAILED_THRESHOLD", "not-a-number");
        let result = RelayConfig::from_env();
        assert!(result.is_err());
        std::env::remove_var("RELAY_FAILED_THRESHOLD");
    }
}
