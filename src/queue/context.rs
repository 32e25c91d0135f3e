//! Narrow contracts of the collaborators the queue talks to

use std::collections::BTreeSet;

use super::key::InstanceId;
use crate::QueueResult;

/// Storage-execution layer (statement batching)
pub trait StorageBackend {
    /// Push any statements still held in the low-level batch
    fn flush_pending_batch(&mut self) -> QueueResult<()>;
}

/// Second-level query cache (update timestamps)
pub trait QueryCache: Send + Sync {
    /// Mark spaces as being modified by the running transaction
    fn pre_invalidate(&self, spaces: &BTreeSet<String>) -> QueueResult<()>;

    /// Invalidate spaces once the transaction outcome is known
    fn invalidate(&self, spaces: &BTreeSet<String>) -> QueueResult<()>;
}

/// Lifecycle status of a managed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    Managed,
    ReadOnly,
    Deleted,
    Gone,
}

/// Persistence-state view of the owning session
pub trait PersistenceContext {
    /// Instance has no persistent identity yet
    fn is_transient(&self, instance: InstanceId) -> bool;

    /// Current status of a managed instance, `None` if unknown to the session
    fn status(&self, instance: InstanceId) -> Option<EntityStatus>;
}
