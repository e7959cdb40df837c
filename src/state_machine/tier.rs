//! Delivery tier definitions and the escalation table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four escalating delivery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTier {
    /// Tier 1: submit to the durable work queue; acceptance is success
    Queue,
    /// Tier 2: synchronous end-to-end resolve/filter/route/send
    Direct,
    /// Tier 3: persist for the periodic batch sweep
    Batch,
    /// Tier 4: persist for manual recovery
    Manual,
}

impl DeliveryTier {
    /// The first tier every delivery starts at
    pub fn initial() -> Self {
        Self::Queue
    }

    /// The escalation table: where a failed attempt at this tier goes next.
    /// `Manual` is the end of the line; its fallback is the out-of-band log.
    pub fn next_on_failure(&self) -> Option<DeliveryTier> {
        match self {
            Self::Queue => Some(Self::Direct),
            Self::Direct => Some(Self::Batch),
            Self::Batch => Some(Self::Manual),
            Self::Manual => None,
        }
    }

    /// Whether success at this tier means a notification was actually sent,
    /// as opposed to the event being safely handed off or persisted
    pub fn is_synchronous(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl fmt::Display for DeliveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Direct => write!(f, "direct"),
            Self::Batch => write!(f, "batch"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for DeliveryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queue" => Ok(Self::Queue),
            "direct" => Ok(Self::Direct),
            "batch" => Ok(Self::Batch),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid delivery tier: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_is_strictly_ordered() {
        assert_eq!(
            DeliveryTier::initial().next_on_failure(),
            Some(DeliveryTier::Direct)
        );
        assert_eq!(
            DeliveryTier::Direct.next_on_failure(),
            Some(DeliveryTier::Batch)
        );
        assert_eq!(
            DeliveryTier::Batch.next_on_failure(),
            Some(DeliveryTier::Manual)
        );
        assert_eq!(DeliveryTier::Manual.next_on_failure(), None);
    }

    #[test]
    fn test_round_trip_strings() {
        for tier in [
            DeliveryTier::Queue,
            DeliveryTier::Direct,
            DeliveryTier::Batch,
            DeliveryTier::Manual,
        ] {
            let parsed: DeliveryTier = tier.to_string().parse().unwrap();
            assert_eq!(parsed, tier);
        }
        assert!("tier5".parse::<DeliveryTier>().is_err());
    }
}
