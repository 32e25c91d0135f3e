use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, trace};

use super::action::{Action, AfterCompletion, BeforeCompletion, Category};
use super::context::{EntityStatus, QueryCache, StorageBackend};
use super::key::InstanceId;
use super::state::ActionQueue;
use super::unresolved::TransientDependencies;
use super::xact::TransactionCallbacks;
use crate::metrics::metrics_api;
use crate::{QueueError, QueueResult};

impl<A: Action> ActionQueue<A> {
    /// File a non-insert action under `category`
    ///
    /// A collection removal whose owner is being deleted and already has a
    /// pending orphan removal is routed to the orphan collection removals.
    pub fn add(&mut self, category: Category, action: A) -> QueueResult<()> {
        let category = match category {
            Category::EntityInsert => {
                return Err(crate::internal_error!(
                    "insert of {} must go through add_insert",
                    action.entity_name()
                ));
            }
            Category::CollectionRemoval if self.is_orphan_owner(&action) => Category::OrphanCollectionRemoval,
            other => other,
        };

        trace!(category = %category, entity = action.entity_name(), key = %action.sort_key(), "queueing action");
        self.container_mut(category).add(action);
        Ok(())
    }

    fn is_orphan_owner(&self, action: &A) -> bool {
        let Some(owner) = action.affected_owner() else {
            return false;
        };
        if self.context.status(owner) != Some(EntityStatus::Deleted) {
            return false;
        }
        self.container(Category::OrphanRemoval)
            .is_some_and(|orphans| orphans.iter().any(|orphan| orphan.instance() == Some(owner)))
    }

    /// Accept an insert, or park it while it references unsaved instances
    ///
    /// An early insert flushes the already queued inserts first and then runs
    /// immediately. Accepting an insert releases every parked insert that was
    /// waiting on its instance, transitively.
    pub fn add_insert(&mut self, action: A, backend: &mut dyn StorageBackend) -> QueueResult<()> {
        if action.is_early_insert() {
            self.execute_inserts(backend)?;
        }

        let context = &self.context;
        let accepted = &self.accepted;
        let dependencies =
            TransientDependencies::find(&action, |id| context.is_transient(id) && !accepted.contains(&id));

        match dependencies {
            Some(dependencies) => {
                trace!(
                    entity = action.entity_name(),
                    key = %action.sort_key(),
                    blocked_on = dependencies.len(),
                    "insert has unresolved non-nullable references"
                );
                self.unresolved.add(action, dependencies);
                Ok(())
            }
            None => self.add_resolved_insert(action, backend),
        }
    }

    fn add_resolved_insert(&mut self, action: A, backend: &mut dyn StorageBackend) -> QueueResult<()> {
        let mut worklist = VecDeque::from([action]);
        let mut veto = None;
        while let Some(insert) = worklist.pop_front() {
            let instance = insert.instance();
            let queued = match self.accept_insert(insert, backend) {
                Ok(queued) => queued,
                // a vetoed insert keeps its dependents parked; released siblings still go in
                Err(e @ QueueError::VetoedInsert { .. }) => {
                    veto.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    let inserts = self.container_mut(Category::EntityInsert);
                    for rest in worklist {
                        inserts.add(rest);
                    }
                    return Err(e);
                }
            };

            if let Some(instance) = instance {
                if queued {
                    self.accepted.insert(instance);
                }
                let released = self.unresolved.resolve_dependent_actions(instance);
                if !released.is_empty() {
                    trace!(instance = %instance, released = released.len(), "resolved parked inserts");
                }
                worklist.extend(released);
            }
        }
        veto.map_or(Ok(()), Err)
    }

    /// Queue the insert, or run it right away when it is early.
    ///
    /// Returns whether the insert is waiting in the insert container.
    fn accept_insert(&mut self, mut insert: A, backend: &mut dyn StorageBackend) -> QueueResult<bool> {
        if insert.is_vetoed() {
            return Err(vetoed(&insert));
        }

        if !insert.is_early_insert() {
            trace!(entity = insert.entity_name(), key = %insert.sort_key(), "queueing insert");
            self.container_mut(Category::EntityInsert).add(insert);
            return Ok(true);
        }

        self.execute_inserts(backend)?;
        let result = insert.execute();
        let cleanup = self.register_cleanup_actions(&mut insert);
        metrics_api::record_single_execution();
        result?;
        cleanup?;

        if insert.is_vetoed() {
            return Err(vetoed(&insert));
        }
        Ok(false)
    }

    /// Register the callbacks (and cache spaces) of a bulk-operation cleanup
    pub fn add_cleanup_action(&mut self, mut action: A) -> QueueResult<()> {
        self.register_cleanup_actions(&mut action)
    }

    fn register_cleanup_actions(&mut self, action: &mut A) -> QueueResult<()> {
        register_callbacks(&self.callbacks, action);
        if let Some(cache) = self.enabled_cache() {
            let spaces: BTreeSet<String> = action.affected_spaces().iter().cloned().collect();
            invalidate_spaces(&self.callbacks, cache.as_ref(), &spaces)?;
        }
        Ok(())
    }

    /// Run every queued action, category by category
    ///
    /// Refuses to start while any insert is still unresolved.
    pub fn execute_actions(&mut self, backend: &mut dyn StorageBackend) -> QueueResult<()> {
        if !self.unresolved.is_empty() {
            return self.unresolved.check_no_unresolved_actions_after_operation();
        }

        for category in Category::ALL {
            self.execute_category(category, backend)?;
        }
        Ok(())
    }

    /// Run only the queued inserts
    pub fn execute_inserts(&mut self, backend: &mut dyn StorageBackend) -> QueueResult<()> {
        self.execute_category(Category::EntityInsert, backend)
    }

    /// Run one action right away and register its cleanup
    pub fn execute(&mut self, mut action: A) -> QueueResult<()> {
        let result = action.execute();
        let cleanup = self.register_cleanup_actions(&mut action);
        metrics_api::record_single_execution();
        result?;
        cleanup
    }

    fn execute_category(&mut self, category: Category, backend: &mut dyn StorageBackend) -> QueueResult<()> {
        let cache = self.enabled_cache();
        let callbacks = &self.callbacks;
        let Some(list) = self.containers[category.index()].as_mut() else {
            return Ok(());
        };
        if list.is_empty() {
            return Ok(());
        }

        let timer = metrics_api::record_execution_start();
        let mut executed = 0;
        let mut outcome = Ok(());
        for action in list.iter_mut() {
            let result = action.execute();
            register_callbacks(callbacks, action);
            executed += 1;
            if let Err(e) = result {
                outcome = Err(e);
                break;
            }
        }

        // spaces of the whole container are invalidated even after a failure
        let invalidated = match &cache {
            Some(cache) => invalidate_spaces(callbacks, cache.as_ref(), list.spaces()),
            None => Ok(()),
        };
        metrics_api::record_category_complete(executed, timer);
        debug!(category = %category, executed, total = list.len(), "executed category");

        outcome?;
        invalidated?;
        if category == Category::EntityInsert {
            // executed instances are persistent now and no longer block parked inserts
            for instance in list.iter().filter_map(|action| action.instance()) {
                self.accepted.remove(&instance);
            }
        }
        list.clear();
        backend.flush_pending_batch()
    }

    /// Order inserts and updates (when the matching ordering is switched on)
    pub fn sort_actions(&mut self) {
        if self.settings.order_updates {
            if let Some(updates) = self.containers[Category::EntityUpdate.index()].as_mut() {
                updates.sort();
            }
        }
        if self.settings.order_inserts {
            if let Some(inserts) = self.containers[Category::EntityInsert.index()].as_mut() {
                inserts.sort();
            }
        }
    }

    /// Order the collection categories (with update ordering switched on)
    pub fn sort_collection_actions(&mut self) {
        if !self.settings.order_updates {
            return;
        }
        for category in [
            Category::CollectionCreation,
            Category::CollectionUpdate,
            Category::CollectionQueuedOp,
            Category::CollectionRemoval,
        ] {
            if let Some(list) = self.containers[category.index()].as_mut() {
                list.sort();
            }
        }
    }

    /// Run `before_executions` on every queued collection action
    pub fn prepare_actions(&mut self) -> QueueResult<()> {
        for category in [
            Category::CollectionRemoval,
            Category::CollectionUpdate,
            Category::CollectionCreation,
            Category::CollectionQueuedOp,
        ] {
            if let Some(list) = self.containers[category.index()].as_mut() {
                for action in list.iter_mut() {
                    action.before_executions()?;
                }
            }
        }
        Ok(())
    }

    /// Whether queued work (including parked inserts) writes any of `tables`
    pub fn affects_table(&self, tables: &BTreeSet<String>) -> bool {
        if tables.is_empty() {
            return false;
        }

        for list in self.containers.iter().flatten() {
            if list.is_empty() {
                continue;
            }
            if let Some(space) = list.spaces().iter().find(|space| tables.contains(*space)) {
                debug!(space = %space, "changes must be flushed to space");
                return true;
            }
        }

        self.unresolved.affects_any(tables)
    }

    pub fn check_no_unresolved_actions_after_operation(&self) -> QueueResult<()> {
        self.unresolved.check_no_unresolved_actions_after_operation()
    }

    pub fn has_unresolved_entity_insert_actions(&self) -> bool {
        !self.unresolved.is_empty()
    }

    pub fn are_insertions_or_deletions_queued(&self) -> bool {
        self.pending_insert_count() > 0 || self.has_unresolved_entity_insert_actions() || self.pending_delete_count() > 0
    }

    pub fn has_any_pending(&self) -> bool {
        self.containers.iter().flatten().any(|list| !list.is_empty()) || !self.unresolved.is_empty()
    }

    pub fn pending_insert_count(&self) -> usize {
        self.len_of(Category::EntityInsert)
    }

    pub fn pending_update_count(&self) -> usize {
        self.len_of(Category::EntityUpdate)
    }

    /// Deletes plus orphan removals
    pub fn pending_delete_count(&self) -> usize {
        self.len_of(Category::EntityDelete) + self.len_of(Category::OrphanRemoval)
    }

    pub fn pending_collection_creation_count(&self) -> usize {
        self.len_of(Category::CollectionCreation)
    }

    pub fn pending_collection_update_count(&self) -> usize {
        self.len_of(Category::CollectionUpdate)
    }

    pub fn pending_collection_removal_count(&self) -> usize {
        self.len_of(Category::CollectionRemoval)
    }

    /// Take back the pending delete (or orphan removal) of a rescued instance
    pub fn unschedule_deletion(&mut self, instance: InstanceId) -> QueueResult<A> {
        for category in [Category::EntityDelete, Category::OrphanRemoval] {
            if let Some(list) = self.containers[category.index()].as_mut() {
                if let Some(position) = list.iter().position(|action| action.instance() == Some(instance)) {
                    if let Some(action) = list.remove(position) {
                        return Ok(action);
                    }
                }
            }
        }
        Err(crate::internal_error!("unable to perform un-delete for instance {}", instance))
    }

    /// Undo what a dirty-check pass queued beyond inserts and deletes
    ///
    /// Collection removals are only trimmed back to their earlier size: the
    /// pass may have queued removals of collections the session never loaded.
    pub fn clear_from_flush_needed_check(&mut self, previous_collection_removal_size: usize) {
        for category in [
            Category::CollectionCreation,
            Category::CollectionUpdate,
            Category::CollectionQueuedOp,
            Category::EntityUpdate,
        ] {
            if let Some(list) = self.containers[category.index()].as_mut() {
                list.clear();
            }
        }
        if let Some(removals) = self.containers[Category::CollectionRemoval.index()].as_mut() {
            let added = removals.len().saturating_sub(previous_collection_removal_size);
            removals.remove_last_n(added);
        }
    }

    pub fn register_before_completion(&self, callback: BeforeCompletion) {
        self.callbacks.register_before(callback);
    }

    pub fn register_after_completion(&self, callback: AfterCompletion) {
        self.callbacks.register_after(callback);
    }

    pub fn has_before_transaction_actions(&self) -> bool {
        !self.shared && self.callbacks.has_before()
    }

    pub fn has_after_transaction_actions(&self) -> bool {
        !self.shared && self.callbacks.has_after()
    }

    /// Drain before-completion callbacks, then push any batched statements
    pub fn before_transaction_completion(&mut self, backend: &mut dyn StorageBackend) -> QueueResult<()> {
        if self.shared {
            return Ok(());
        }
        self.callbacks.drain_before()?;
        backend.flush_pending_batch()
    }

    /// Drain after-completion callbacks with the transaction outcome
    pub fn after_transaction_completion(&mut self, success: bool) -> QueueResult<()> {
        if self.shared {
            return Ok(());
        }
        let cache = self.enabled_cache();
        self.callbacks.drain_after(success, cache.as_deref())
    }
}

fn vetoed<A: Action>(insert: &A) -> QueueError {
    QueueError::VetoedInsert {
        entity: insert.entity_name().to_string(),
        id: insert.entity_id(),
    }
}

fn register_callbacks<A: Action>(callbacks: &TransactionCallbacks, action: &mut A) {
    if let Some(callback) = action.before_commit_callback() {
        callbacks.register_before(callback);
    }
    if let Some(callback) = action.after_commit_callback() {
        callbacks.register_after(callback);
    }
}

/// Remember `spaces` for after completion and pre-invalidate them in one call
fn invalidate_spaces(
    callbacks: &TransactionCallbacks,
    cache: &dyn QueryCache,
    spaces: &BTreeSet<String>,
) -> QueueResult<()> {
    if spaces.is_empty() {
        return Ok(());
    }
    callbacks.add_spaces_to_invalidate(spaces);
    cache.pre_invalidate(spaces)
}
