//! Queue-item status definitions and transition legality.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted status of a delivery queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting for the batch sweep to pick it up
    Pending,
    /// Claimed by a sweep run
    Processing,
    /// Replayed successfully
    Completed,
    /// Replay failed; eligible for the bounded retry edge
    Failed,
    /// Parked for operator-driven recovery
    ManualRecovery,
    /// Unrecoverable (malformed payload or similar)
    Error,
}

impl QueueItemStatus {
    /// Whether a transition to `next` is legal.
    ///
    /// Transitions are monotonic with one exception: the explicit
    /// `Failed -> Pending` retry edge, which callers must additionally bound
    /// by the max-auto-retries cap.
    pub fn can_transition_to(&self, next: QueueItemStatus) -> bool {
        use QueueItemStatus::*;
        match (self, next) {
            (Pending, Processing) => true,
            (Pending, Failed) => true, // malformed rows are failed without a claim
            (Processing, Completed) => true,
            (Processing, Failed) => true,
            (Processing, Pending) => true, // stale claim released by emergency heal
            (Failed, Pending) => true,     // the bounded retry edge
            (Failed, Error) => true,
            (ManualRecovery, Pending) => true, // operator-triggered retry
            (ManualRecovery, Failed) => true,
            _ => false,
        }
    }

    /// Terminal statuses never leave via automatic repair
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for QueueItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::ManualRecovery => write!(f, "manual_recovery"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "manual_recovery" => Ok(Self::ManualRecovery),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid queue item status: {s}")),
        }
    }
}
