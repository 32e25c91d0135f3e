//! Transactional write-behind action queue
//!
//! A session records its pending inserts, updates, deletes and collection
//! work as actions and hands them to an [`ActionQueue`]. At flush time the
//! queue runs them in a fixed category order, optionally regrouping inserts
//! by entity type without breaking foreign-key order, and keeps the
//! before/after transaction completion callbacks the actions register.
//!
//! The queue never talks to a store directly; storage batching, the query
//! cache and the persistence state are reached through the traits in
//! [`queue::context`].

pub mod config;
pub mod dependency;
pub mod error;
pub mod metrics;
pub mod queue;
#[cfg(test)]
mod test_support;

pub use config::QueueSettings;
pub use error::{CompletionPhase, QueueError, QueueResult};
pub use queue::{Action, ActionQueue, Category, InstanceId, SortKey};
