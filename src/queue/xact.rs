//! Before/after transaction completion callback queues
//!
//! Registration may happen while a drain is running (a callback registering
//! another callback), so each queue sits behind its own mutex and the lock is
//! released before a popped callback is invoked. Draining itself is done by
//! the owning session only.

use std::collections::{BTreeSet, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::action::{AfterCompletion, BeforeCompletion};
use super::context::QueryCache;
use crate::error::CompletionPhase;
use crate::metrics::metrics_api;
use crate::{QueueError, QueueResult};

/// Callback queue pair of one transaction, shareable between two sessions
#[derive(Default)]
pub struct TransactionCallbacks {
    before: Mutex<VecDeque<BeforeCompletion>>,
    after: Mutex<VecDeque<AfterCompletion>>,
    spaces_to_invalidate: Mutex<BTreeSet<String>>,
}

impl TransactionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before(&self, callback: BeforeCompletion) {
        self.before.lock().push_back(callback);
    }

    pub fn register_after(&self, callback: AfterCompletion) {
        self.after.lock().push_back(callback);
    }

    pub fn has_before(&self) -> bool {
        !self.before.lock().is_empty()
    }

    pub fn has_after(&self) -> bool {
        !self.after.lock().is_empty()
    }

    /// Record spaces for the single invalidation call after completion
    pub fn add_spaces_to_invalidate<'a>(&self, spaces: impl IntoIterator<Item = &'a String>) {
        self.spaces_to_invalidate.lock().extend(spaces.into_iter().cloned());
    }

    pub fn spaces_to_invalidate(&self) -> BTreeSet<String> {
        self.spaces_to_invalidate.lock().clone()
    }

    /// Run every before-completion callback in registration order.
    ///
    /// The first failure aborts the drain; callbacks behind it stay queued.
    pub fn drain_before(&self) -> QueueResult<()> {
        loop {
            let next = self.before.lock().pop_front();
            let Some(callback) = next else {
                return Ok(());
            };
            callback().map_err(|e| wrap(CompletionPhase::Before, e))?;
        }
    }

    /// Run every after-completion callback with the transaction outcome, then
    /// invalidate the accumulated spaces once.
    ///
    /// Cache failures raised by a callback are logged and skipped; any other
    /// failure aborts the drain.
    pub fn drain_after(&self, success: bool, cache: Option<&dyn QueryCache>) -> QueueResult<()> {
        loop {
            let next = self.after.lock().pop_front();
            let Some(callback) = next else {
                break;
            };
            match callback(success) {
                Ok(()) => {}
                Err(e) if e.is_recoverable_cache_error() => {
                    warn!(error = %e, "could not release a cache lock after transaction completion");
                }
                Err(e) => return Err(wrap(CompletionPhase::After, e)),
            }
        }

        let spaces = std::mem::take(&mut *self.spaces_to_invalidate.lock());
        if let Some(cache) = cache {
            if !spaces.is_empty() {
                debug!(spaces = spaces.len(), "invalidating query spaces after transaction completion");
                metrics_api::record_spaces_invalidated(spaces.len());
                cache.invalidate(&spaces)?;
            }
        }
        Ok(())
    }

    /// Drop everything registered so far without running it
    pub fn clear(&self) {
        self.before.lock().clear();
        self.after.lock().clear();
        self.spaces_to_invalidate.lock().clear();
    }
}

impl std::fmt::Debug for TransactionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCallbacks")
            .field("before", &self.before.lock().len())
            .field("after", &self.after.lock().len())
            .field("spaces_to_invalidate", &*self.spaces_to_invalidate.lock())
            .finish()
    }
}

fn wrap(phase: CompletionPhase, error: QueueError) -> QueueError {
    match error {
        QueueError::Callback { .. } => error,
        other => QueueError::Callback {
            phase,
            error: other.to_string(),
        },
    }
}
