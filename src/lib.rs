#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Relay Core
//!
//! Guaranteed multi-tier delivery core relaying CRM lifecycle events to
//! chat endpoints across many tenants. The design goal is simple to state:
//! an accepted event is never silently dropped, even while the work queue,
//! the chat endpoint, or the database is degraded.
//!
//! ## Architecture
//!
//! Inbound events flow through tenant resolution, rule matching and
//! filtering, duplicate suppression, and channel routing into the tiered
//! delivery state machine:
//!
//! ```text
//! Queue (accepted) → Direct (sent) → Batch (persisted, swept) → Manual
//! ```
//!
//! Each tier only runs after the previous one failed; any unexpected error
//! jumps straight to manual recovery, whose own last resort is an
//! append-only fallback file. A self-healing watchdog runs on a timer,
//! repairing queue backlog, stale claims, malformed rows, and
//! tenant-mapping gaps.
//!
//! ## Delivery guarantees
//!
//! At-least-once with best-effort duplicate suppression. Tier-1 success
//! means the work queue accepted the job, not that the message was sent.
//! The orchestrator and the watchdog share no locks; all cross-task safety
//! comes from conditional row updates in the store.
//!
//! ## Module Organization
//!
//! - [`events`] - The opaque inbound CRM event and its typed accessors
//! - [`models`] - SQLx data layer (tenants, rules, endpoints, queue, log)
//! - [`store`] - The `DeliveryStore` seam and its Postgres implementation
//! - [`resolver`] - Tenant resolution cascade and mapping strategies
//! - [`matcher`] - Event alias table, rule matching, filter predicates
//! - [`router`] - Deterministic endpoint selection
//! - [`dedup`] - TTL-based duplicate suppression
//! - [`messaging`] - Tier-1 work queue over pgmq
//! - [`sink`] - Outbound chat boundary
//! - [`state_machine`] - Tier escalation table and status legality
//! - [`orchestration`] - The tiered orchestrator and batch sweeper
//! - [`monitor`] - The self-healing watchdog
//! - [`ops`] - The assembled system and its operational surface
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relay_core::config::RelayConfig;
//! use relay_core::events::CrmEvent;
//! use relay_core::ops::RelaySystem;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_env()?;
//! let mut system = RelaySystem::bootstrap(config).await?;
//! system.start_background_tasks();
//!
//! let event = CrmEvent::new("deal.won", json!({ "id": 7, "value": 75000 }))
//!     .with_company_id("42");
//! let outcome = system.guarantee_delivery(event).await;
//! println!("delivered via {} tier: {}", outcome.tier, outcome.detail);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod logging;
pub mod matcher;
pub mod messaging;
pub mod models;
pub mod monitor;
pub mod ops;
pub mod orchestration;
pub mod resolver;
pub mod router;
pub mod sink;
pub mod state_machine;
pub mod store;
pub mod test_helpers;

pub use config::{DedupConfig, DeliveryConfig, FilterPolicy, MonitorConfig, RelayConfig};
pub use error::{RelayError, Result};
pub use events::CrmEvent;
pub use monitor::{HealthReport, SelfHealingMonitor};
pub use orchestration::{BatchSweeper, DeliveryOrchestrator, DeliveryOutcome};
pub use state_machine::{DeliveryTier, QueueItemStatus};
