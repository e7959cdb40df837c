//! Structured reports the watchdog returns to its caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::models::delivery_log::DeliveryStats;

/// Severity of a health finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Critical,
}

/// One finding from a health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIssue {
    pub severity: IssueSeverity,
    pub component: String,
    pub message: String,
}

impl HealthIssue {
    pub fn info(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Info,
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn warning(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn critical(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Critical,
            component: component.into(),
            message: message.into(),
        }
    }
}

/// The structured result of one watchdog run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<HealthIssue>,
    pub auto_fixes: Vec<String>,
    pub manual_actions: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            healthy: true,
            issues: Vec::new(),
            auto_fixes: Vec::new(),
            manual_actions: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    /// Fold one check's findings in; anything above Info marks unhealthy
    pub fn absorb(&mut self, findings: CheckFindings) {
        for issue in &findings.issues {
            if issue.severity != IssueSeverity::Info {
                self.healthy = false;
            }
        }
        if !findings.manual_actions.is_empty() {
            self.healthy = false;
        }
        self.issues.extend(findings.issues);
        self.auto_fixes.extend(findings.auto_fixes);
        self.manual_actions.extend(findings.manual_actions);
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Findings of a single isolated check
#[derive(Debug, Clone, Default)]
pub struct CheckFindings {
    pub issues: Vec<HealthIssue>,
    pub auto_fixes: Vec<String>,
    pub manual_actions: Vec<String>,
}

/// The structured result of an emergency heal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub requeued_failures: u64,
    pub requeued_manual: u64,
    pub drained_batch_items: usize,
    pub released_stale_locks: u64,
    pub errors: Vec<String>,
    pub healed_at: DateTime<Utc>,
}

/// The structured result of an operator-triggered retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryReport {
    pub requeued: u64,
    pub requeued_manual: u64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_findings_keep_report_healthy() {
        let mut report = HealthReport::new();
        report.absorb(CheckFindings {
            issues: vec![HealthIssue::info("endpoints", "3 active endpoints sampled")],
            ..Default::default()
        });
        assert!(report.healthy);
    }

    #[test]
    fn test_warning_or_manual_action_marks_unhealthy() {
        let mut report = HealthReport::new();
        report.absorb(CheckFindings {
            issues: vec![HealthIssue::warning("queue", "failure count over threshold")],
            ..Default::default()
        });
        assert!(!report.healthy);

        let mut report = HealthReport::new();
        report.absorb(CheckFindings {
            manual_actions: vec!["consolidate duplicate mapping".to_string()],
            ..Default::default()
        });
        assert!(!report.healthy);
    }
}
