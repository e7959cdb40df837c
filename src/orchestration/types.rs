//! # Orchestration Types
//!
//! Shared result structures for the delivery pipeline: the structured
//! outcome `guarantee_delivery` always returns, the direct-path summary,
//! and the batch sweep report.

use crate::state_machine::DeliveryTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The structured outcome every caller of `guarantee_delivery` receives.
/// No exception ever escapes that call; failure lives in `success: false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// Whether the event is safely handled (sent, queued, or persisted for replay)
    pub success: bool,
    /// The tier that terminated the walk
    pub tier: DeliveryTier,
    pub delivery_id: Uuid,
    /// Notifications actually transmitted (only the direct tier sends synchronously)
    pub notifications_sent: usize,
    pub detail: String,
    pub completed_at: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn new(
        success: bool,
        tier: DeliveryTier,
        delivery_id: Uuid,
        notifications_sent: usize,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            success,
            tier,
            delivery_id,
            notifications_sent,
            detail: detail.into(),
            completed_at: Utc::now(),
        }
    }
}

/// Summary of one direct (Tier-2 path) delivery pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectOutcome {
    pub tenant_id: Option<i64>,
    pub company_id: Option<String>,
    pub matched_rules: usize,
    pub notifications_sent: usize,
    pub suppressed_duplicates: usize,
    pub filtered_out: usize,
    pub send_failures: usize,
}

impl DirectOutcome {
    /// Rules that actually attempted a send: matched, not filtered out,
    /// not suppressed as duplicates
    pub fn attempted_sends(&self) -> usize {
        self.matched_rules
            .saturating_sub(self.filtered_out)
            .saturating_sub(self.suppressed_duplicates)
    }

    /// A pass that intended no send (no matching rule, everything filtered
    /// or deduplicated) is a success with zero notifications; otherwise at
    /// least one notification must have gone out
    pub fn succeeded(&self) -> bool {
        self.attempted_sends() == 0 || self.notifications_sent >= 1
    }
}

/// Report of one batch sweep run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn merge(&mut self, other: &SweepReport) {
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.failed += other.failed;
    }
}
