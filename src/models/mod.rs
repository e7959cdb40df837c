//! # Data Layer
//!
//! SQLx-backed models for the delivery core's five tables: tenants, rules,
//! endpoints, the delivery queue, and the append-only delivery log.
//!
//! Queries use the runtime-checked `sqlx::query_as::<_, T>` API so the crate
//! builds without a live database. Every state-changing update on a queue
//! item is conditional on its current status; that is the crate's entire
//! cross-task synchronization story (see `store`).

pub mod delivery_log;
pub mod endpoint;
pub mod queue_item;
pub mod rule;
pub mod tenant;

pub use delivery_log::{DeliveryLogEntry, NewDeliveryLogEntry};
pub use endpoint::ChannelEndpoint;
pub use queue_item::{NewQueueItem, QueueItem};
pub use rule::Rule;
pub use tenant::Tenant;
