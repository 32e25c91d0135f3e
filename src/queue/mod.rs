//! Transactional write-behind action queue
//!
//! This module holds the queue a session fills while it tracks changes:
//! - `ActionQueue`: nine category containers executed in a fixed order
//! - `ExecutableList`: ordered container of one category
//! - `UnresolvedInserts`: inserts parked on transient references
//! - `TransactionCallbacks`: before/after completion callback queues
//! - `QueueSnapshot`: versioned byte-stream form of a whole queue

pub mod action;
pub mod context;
pub mod executable;
pub mod key;
mod ops;
pub mod persistence;
mod state;
pub mod unresolved;
pub mod xact;

pub use action::{Action, AfterCompletion, BeforeCompletion, Category, Property, PropertyValue};
pub use context::{EntityStatus, PersistenceContext, QueryCache, StorageBackend};
pub use executable::{ExecutableList, Sorter};
pub use key::{InstanceId, SortKey};
pub use persistence::{QueueSnapshot, SnapshotFormat, SnapshotMetadata};
pub use state::ActionQueue;
pub use unresolved::{TransientDependencies, UnresolvedInserts};
pub use xact::TransactionCallbacks;
