//! # Delivery State Machine
//!
//! Typed tier and status definitions for the delivery pipeline.
//!
//! The tier enum carries its own escalation table so illegal transitions
//! (e.g. batch before queue was attempted) are unrepresentable: the
//! orchestrator can only walk `next_on_failure()` edges. Queue-item status
//! legality is likewise encoded here rather than scattered across callers.

pub mod states;
pub mod tier;

pub use states::QueueItemStatus;
pub use tier::DeliveryTier;
