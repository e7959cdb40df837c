//! # Self-Healing Watchdog
//!
//! Periodic detection and repair of queue backlog, stale rows, malformed
//! payloads, and tenant-mapping gaps, plus the operator-triggered emergency
//! variant. Runs concurrently with the orchestrator with no mutual
//! exclusion; safety comes from the store's conditional updates.

pub mod report;
pub mod self_healing;

pub use report::{
    CheckFindings, DeliveryStats, EmergencyReport, HealthIssue, HealthReport, IssueSeverity,
    RetryReport,
};
pub use self_healing::SelfHealingMonitor;
