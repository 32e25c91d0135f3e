//! Inserts parked until the transient instances they reference are saved
//!
//! An insert whose non-nullable association points at an instance with no
//! persistent identity (and no accepted insert) cannot be scheduled yet. It
//! waits here until every instance it is blocked on gets its own insert
//! accepted by the queue.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::action::{Action, Property, PropertyValue};
use super::key::InstanceId;
use crate::{QueueError, QueueResult};

/// One transient instance an insert is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientReference {
    pub entity_name: String,
    /// Attribute paths (`address.country`) referencing the instance
    pub property_paths: BTreeSet<String>,
}

/// Non-nullable references of one insert to transient instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientDependencies {
    references: BTreeMap<InstanceId, TransientReference>,
}

impl TransientDependencies {
    /// Scan an insert's state; `None` when nothing blocks it
    ///
    /// A reference to the inserted instance itself never blocks.
    pub fn find<A: Action>(action: &A, is_unsaved: impl Fn(InstanceId) -> bool) -> Option<Self> {
        let own = action.instance();
        let mut dependencies = Self::default();
        dependencies.scan(action.properties(), "", &|id| Some(id) != own && is_unsaved(id));
        (!dependencies.is_empty()).then_some(dependencies)
    }

    fn scan(&mut self, properties: &[Property], prefix: &str, is_unsaved: &dyn Fn(InstanceId) -> bool) {
        for property in properties {
            let path = if prefix.is_empty() {
                property.name.clone()
            } else {
                format!("{prefix}.{}", property.name)
            };
            match &property.value {
                PropertyValue::Entity {
                    target,
                    entity_name,
                    nullable: false,
                    ..
                } if is_unsaved(*target) => {
                    self.references
                        .entry(*target)
                        .or_insert_with(|| TransientReference {
                            entity_name: entity_name.clone(),
                            property_paths: BTreeSet::new(),
                        })
                        .property_paths
                        .insert(path);
                }
                PropertyValue::Component(nested) => self.scan(nested, &path, is_unsaved),
                _ => {}
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn contains(&self, instance: InstanceId) -> bool {
        self.references.contains_key(&instance)
    }

    fn resolve(&mut self, instance: InstanceId) -> bool {
        self.references.remove(&instance).is_some()
    }

    fn first(&self) -> Option<(&InstanceId, &TransientReference)> {
        self.references.iter().next()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnresolvedEntry<A> {
    action: A,
    dependencies: TransientDependencies,
}

/// Tracker of blocked inserts, in the order they were parked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedInserts<A> {
    entries: Vec<UnresolvedEntry<A>>,
}

impl<A> Default for UnresolvedInserts<A> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<A: Action> UnresolvedInserts<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an insert that is blocked on transient instances
    pub fn add(&mut self, action: A, dependencies: TransientDependencies) {
        tracing::trace!(
            entity = action.entity_name(),
            blocked_on = dependencies.len(),
            "parking unresolved insert"
        );
        self.entries.push(UnresolvedEntry { action, dependencies });
    }

    /// `instance` just got an accepted insert: release every parked insert
    /// that was waiting only on it. Returned in parking order.
    pub fn resolve_dependent_actions(&mut self, instance: InstanceId) -> Vec<A> {
        let mut touched = false;
        for entry in &mut self.entries {
            touched |= entry.dependencies.resolve(instance);
        }
        if !touched {
            return Vec::new();
        }

        let (resolved, blocked): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.dependencies.is_empty());
        self.entries = blocked;

        resolved.into_iter().map(|entry| entry.action).collect()
    }

    /// Fail with the first still-blocked insert, if any
    pub fn check_no_unresolved_actions_after_operation(&self) -> QueueResult<()> {
        let Some(entry) = self.entries.first() else {
            return Ok(());
        };
        let (_, reference) = entry
            .dependencies
            .first()
            .ok_or_else(|| crate::internal_error!("unresolved insert without dependencies"))?;

        Err(QueueError::UnresolvedReference {
            entity: entry.action.entity_name().to_string(),
            id: entry.action.entity_id(),
            transient_entity: reference.entity_name.clone(),
            property_path: reference.property_paths.iter().next().cloned().unwrap_or_default(),
        })
    }

    pub fn dependent_actions(&self) -> impl Iterator<Item = &A> {
        self.entries.iter().map(|entry| &entry.action)
    }

    /// Whether any parked insert writes one of `spaces`
    pub fn affects_any(&self, spaces: &BTreeSet<String>) -> bool {
        self.dependent_actions()
            .flat_map(|action| action.affected_spaces())
            .any(|space| spaces.contains(space))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
