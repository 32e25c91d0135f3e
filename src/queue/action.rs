//! Action contract and the fixed category table
//!
//! An action is one pending mutation (insert, update, delete or collection
//! work) handed to the queue by the owning session. The queue never builds
//! actions itself; it only files them by [`Category`], orders them and runs
//! their effects.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::key::{InstanceId, SortKey};
use crate::config::{QueueSettings, CATEGORY_COUNT};
use crate::QueueResult;

/// Callback run at the before-completion boundary
pub type BeforeCompletion = Box<dyn FnOnce() -> QueueResult<()> + Send>;

/// Callback run at the after-completion boundary; receives the transaction outcome
pub type AfterCompletion = Box<dyn FnOnce(bool) -> QueueResult<()> + Send>;

/// The nine action categories, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Category {
    OrphanCollectionRemoval = 0,
    OrphanRemoval = 1,
    EntityInsert = 2,
    EntityUpdate = 3,
    CollectionQueuedOp = 4,
    CollectionRemoval = 5,
    CollectionUpdate = 6,
    CollectionCreation = 7,
    EntityDelete = 8,
}

impl Category {
    /// Fixed execution order
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::OrphanCollectionRemoval,
        Category::OrphanRemoval,
        Category::EntityInsert,
        Category::EntityUpdate,
        Category::CollectionQueuedOp,
        Category::CollectionRemoval,
        Category::CollectionUpdate,
        Category::CollectionCreation,
        Category::EntityDelete,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Category::OrphanCollectionRemoval => "orphanCollectionRemovals",
            Category::OrphanRemoval => "orphanRemovals",
            Category::EntityInsert => "insertions",
            Category::EntityUpdate => "updates",
            Category::CollectionQueuedOp => "collectionQueuedOps",
            Category::CollectionRemoval => "collectionRemovals",
            Category::CollectionUpdate => "collectionUpdates",
            Category::CollectionCreation => "collectionCreations",
            Category::EntityDelete => "deletions",
        }
    }

    /// Collection categories get `before_executions` from `prepare_actions`
    pub const fn is_collection(self) -> bool {
        matches!(
            self,
            Category::CollectionQueuedOp
                | Category::CollectionRemoval
                | Category::CollectionUpdate
                | Category::CollectionCreation
        )
    }

    /// Removals and deletes always execute in arrival order
    pub const fn requires_sorting(self, settings: &QueueSettings) -> bool {
        match self {
            Category::OrphanCollectionRemoval | Category::OrphanRemoval | Category::EntityDelete => false,
            Category::EntityInsert => settings.order_inserts,
            _ => settings.order_updates,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One persisted attribute of an insert, as seen by dependency analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue) -> Self {
        Self { name: name.into(), value }
    }

    /// Non-nullable to-one reference
    pub fn reference(name: impl Into<String>, target: InstanceId, entity_name: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyValue::Entity {
                target,
                entity_name: entity_name.into(),
                nullable: false,
                to_parent_unique_key: false,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Scalar or null; nothing to follow
    Basic,

    /// To-one association
    Entity {
        target: InstanceId,
        entity_name: String,
        nullable: bool,
        /// To-parent one-to-one keyed by a non-primary unique key; the
        /// referenced row waits on this one instead of the other way round
        to_parent_unique_key: bool,
    },

    /// Owned (mapped-by) one-to-many whose elements are entities
    OneToMany {
        elements: Vec<InstanceId>,
    },

    /// Embedded value holding further attributes
    Component(Vec<Property>),
}

/// A pending unit of work owned by the queue
///
/// Insert- and collection-specific accessors have defaults so that a single
/// action type can serve every category.
pub trait Action: fmt::Debug {
    /// Entity or collection role name (primary sort classifier)
    fn entity_name(&self) -> &str;

    /// Identifier or collection key (secondary sort classifier)
    fn sort_key(&self) -> &SortKey;

    /// Storage spaces (tables) written by this action
    fn affected_spaces(&self) -> &[String];

    /// Run the effect against the store
    fn execute(&mut self) -> QueueResult<()>;

    fn before_commit_callback(&mut self) -> Option<BeforeCompletion> {
        None
    }

    fn after_commit_callback(&mut self) -> Option<AfterCompletion> {
        None
    }

    /// Hook run by `prepare_actions` for collection actions
    fn before_executions(&mut self) -> QueueResult<()> {
        Ok(())
    }

    /// Instance written by this action (inserts, deletes, orphan removals)
    fn instance(&self) -> Option<InstanceId> {
        None
    }

    /// Identifier rendered for diagnostics
    fn entity_id(&self) -> String {
        self.sort_key().to_string()
    }

    /// Persisted attribute state (inserts)
    fn properties(&self) -> &[Property] {
        &[]
    }

    /// Owner of the affected collection (collection actions)
    fn affected_owner(&self) -> Option<InstanceId> {
        None
    }

    /// Insert whose store-generated identifier is needed immediately
    fn is_early_insert(&self) -> bool {
        false
    }

    /// Insert rejected by a pre-insert policy hook
    fn is_vetoed(&self) -> bool {
        false
    }
}

/// Natural (primary, secondary) ordering of two actions
pub(crate) fn natural_order<A: Action + ?Sized>(a: &A, b: &A) -> std::cmp::Ordering {
    a.entity_name()
        .cmp(b.entity_name())
        .then_with(|| a.sort_key().cmp(b.sort_key()))
}
