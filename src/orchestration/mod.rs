//! # Delivery Orchestration
//!
//! The core of the crate: the tiered delivery state machine
//! ([`DeliveryOrchestrator`]), the synchronous direct pipeline it shares
//! with the batch replayer ([`DirectPipeline`]), and the bounded periodic
//! sweep over persisted batch rows ([`BatchSweeper`]).

pub mod batch_sweeper;
pub mod delivery_orchestrator;
pub mod direct;
pub mod types;

pub use batch_sweeper::BatchSweeper;
pub use delivery_orchestrator::DeliveryOrchestrator;
pub use direct::DirectPipeline;
pub use types::{DeliveryOutcome, DirectOutcome, SweepReport};
