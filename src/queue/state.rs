use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use super::action::{Action, Category};
use super::context::{PersistenceContext, QueryCache};
use super::executable::ExecutableList;
use super::key::InstanceId;
use super::persistence::{ContainerView, QueueSnapshot, SnapshotFormat, SnapshotMetadata, SnapshotView};
use super::unresolved::UnresolvedInserts;
use super::xact::TransactionCallbacks;
use crate::config::{QueueSettings, CATEGORY_COUNT, SNAPSHOT_FORMAT_VERSION};
use crate::dependency::InsertActionSorter;
use crate::{QueueError, QueueResult};

/// Write-behind queue of one session
///
/// Actions are filed into nine category containers and executed in the
/// fixed [`Category::ALL`] order at flush time. Containers are allocated on
/// first use. Inserts blocked on transient instances wait in the unresolved
/// tracker until the instance they reference is itself accepted.
pub struct ActionQueue<A> {
    pub(super) settings: QueueSettings,
    pub(super) context: Arc<dyn PersistenceContext>,
    pub(super) cache: Option<Arc<dyn QueryCache>>,
    pub(super) session: String,
    pub(super) containers: [Option<ExecutableList<A>>; CATEGORY_COUNT],
    pub(super) unresolved: UnresolvedInserts<A>,
    /// Instances whose insert has been accepted (no longer transient for analysis)
    pub(super) accepted: HashSet<InstanceId>,
    pub(super) callbacks: Arc<TransactionCallbacks>,
    /// Bound to another session's callback queues; drains are left to that owner
    pub(super) shared: bool,
}

impl<A: Action> ActionQueue<A> {
    pub fn new(settings: QueueSettings, context: Arc<dyn PersistenceContext>) -> Self {
        Self {
            settings,
            context,
            cache: None,
            session: "unknown".to_string(),
            containers: std::array::from_fn(|_| None),
            unresolved: UnresolvedInserts::new(),
            accepted: HashSet::new(),
            callbacks: Arc::new(TransactionCallbacks::new()),
            shared: false,
        }
    }

    /// Attach the query cache; only consulted when `query_cache_enabled` is set
    pub fn with_query_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Name recorded in snapshots taken from this queue
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Container of `category`, `None` if it was never instantiated
    pub fn container(&self, category: Category) -> Option<&ExecutableList<A>> {
        self.containers[category.index()].as_ref()
    }

    pub(super) fn container_mut(&mut self, category: Category) -> &mut ExecutableList<A> {
        let settings = self.settings;
        self.containers[category.index()].get_or_insert_with(|| new_container(category, &settings))
    }

    pub(super) fn len_of(&self, category: Category) -> usize {
        self.container(category).map_or(0, ExecutableList::len)
    }

    /// Cache to notify, if caching is switched on
    pub(super) fn enabled_cache(&self) -> Option<Arc<dyn QueryCache>> {
        if self.settings.query_cache_enabled {
            self.cache.clone()
        } else {
            None
        }
    }

    /// Actions held by all containers and the unresolved tracker
    pub fn pending_action_count(&self) -> usize {
        Category::ALL.iter().map(|&c| self.len_of(c)).sum::<usize>() + self.unresolved.len()
    }

    /// Drop every queued action (session clear); registered callbacks survive
    pub fn clear(&mut self) {
        for list in self.containers.iter_mut().flatten() {
            list.clear();
        }
        self.unresolved.clear();
        self.accepted.clear();
    }

    /// Callback queue pair, for binding a second session to this transaction
    pub fn transaction_callbacks(&self) -> Arc<TransactionCallbacks> {
        Arc::clone(&self.callbacks)
    }

    /// Use `callbacks` instead of this queue's own pair.
    ///
    /// With `shared` set this queue only registers; the owner drains.
    pub fn bind_transaction_callbacks(&mut self, callbacks: Arc<TransactionCallbacks>, shared: bool) {
        self.callbacks = callbacks;
        self.shared = shared;
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

fn new_container<A: Action>(category: Category, settings: &QueueSettings) -> ExecutableList<A> {
    match category {
        Category::EntityInsert if settings.order_inserts => ExecutableList::with_sorter(Box::new(InsertActionSorter)),
        _ => ExecutableList::new(category.requires_sorting(settings)),
    }
}

impl<A: Action + Serialize> ActionQueue<A> {
    /// Capture the queue as a bincode byte stream
    pub fn serialize(&self) -> QueueResult<Vec<u8>> {
        self.serialize_as(SnapshotFormat::Binary)
    }

    pub fn serialize_as(&self, format: SnapshotFormat) -> QueueResult<Vec<u8>> {
        let view = SnapshotView {
            version: SNAPSHOT_FORMAT_VERSION,
            metadata: SnapshotMetadata::capture(&self.session, self.pending_action_count()),
            unresolved: &self.unresolved,
            categories: self
                .containers
                .iter()
                .map(|slot| {
                    slot.as_ref().map(|list| ContainerView {
                        sorted: list.is_sorted(),
                        spaces: list.cached_spaces(),
                        actions: list.actions(),
                    })
                })
                .collect(),
        };

        let bytes = view.encode(format)?;
        info!(
            session = %self.session,
            pending = view.metadata.pending_actions,
            bytes = bytes.len(),
            "captured action queue snapshot"
        );
        Ok(bytes)
    }
}

impl<A: Action + DeserializeOwned> ActionQueue<A> {
    /// Rebuild a queue from [`ActionQueue::serialize`] output
    pub fn deserialize(
        data: &[u8],
        settings: QueueSettings,
        context: Arc<dyn PersistenceContext>,
    ) -> QueueResult<Self> {
        Self::deserialize_as(SnapshotFormat::Binary, data, settings, context)
    }

    pub fn deserialize_as(
        format: SnapshotFormat,
        data: &[u8],
        settings: QueueSettings,
        context: Arc<dyn PersistenceContext>,
    ) -> QueueResult<Self> {
        let snapshot = QueueSnapshot::<A>::decode(format, data)?;
        if snapshot.categories.len() != CATEGORY_COUNT {
            return Err(QueueError::SerializationError {
                message: format!(
                    "snapshot holds {} categories, expected {CATEGORY_COUNT}",
                    snapshot.categories.len()
                ),
            });
        }

        let mut queue = Self::new(settings, context);
        queue.unresolved = snapshot.unresolved;
        for (category, slot) in Category::ALL.into_iter().zip(snapshot.categories) {
            if let Some(container) = slot {
                queue
                    .container_mut(category)
                    .restore(container.sorted, container.spaces, container.actions);
            }
        }
        queue.accepted = queue
            .container(Category::EntityInsert)
            .into_iter()
            .flat_map(ExecutableList::iter)
            .filter_map(Action::instance)
            .collect();

        info!(
            source_session = %snapshot.metadata.source_session,
            captured_at = %snapshot.metadata.captured_at,
            pending = queue.pending_action_count(),
            "restored action queue snapshot"
        );
        Ok(queue)
    }
}

impl<A: Action> fmt::Display for ActionQueue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionQueue[")?;
        for category in Category::ALL {
            write!(f, "{category}={} ", self.len_of(category))?;
        }
        write!(f, "unresolvedInsertDependencies={}]", self.unresolved.len())
    }
}

impl<A: Action> fmt::Debug for ActionQueue<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("session", &self.session)
            .field("settings", &self.settings)
            .field("containers", &self.containers)
            .field("unresolved", &self.unresolved)
            .field("callbacks", &self.callbacks)
            .field("shared", &self.shared)
            .finish()
    }
}
