//! Ordered container for the actions of one category
//!
//! Keeps the actions in arrival order, remembers whether that order is
//! already the canonical one, and lazily materializes the union of the
//! storage spaces its actions touch.

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::fmt;

use super::action::{natural_order, Action};

/// Custom ordering strategy for a container (e.g. insert regrouping)
pub trait Sorter<A> {
    fn sort(&self, actions: &mut Vec<A>);
}

pub struct ExecutableList<A> {
    actions: Vec<A>,
    /// Union of affected spaces; empty cell means "unknown, recompute"
    spaces: OnceCell<BTreeSet<String>>,
    sorted: bool,
    requires_sorting: bool,
    sorter: Option<Box<dyn Sorter<A>>>,
}

impl<A: Action> ExecutableList<A> {
    /// Container sorted by natural (role, key) order when `requires_sorting`
    pub fn new(requires_sorting: bool) -> Self {
        Self {
            actions: Vec::new(),
            spaces: OnceCell::new(),
            sorted: !requires_sorting,
            requires_sorting,
            sorter: None,
        }
    }

    /// Container ordered by a custom sorter
    pub fn with_sorter(sorter: Box<dyn Sorter<A>>) -> Self {
        Self {
            actions: Vec::new(),
            spaces: OnceCell::new(),
            sorted: false,
            requires_sorting: true,
            sorter: Some(sorter),
        }
    }

    /// Append an action
    ///
    /// Always accepted; the return value mirrors collection `add` contracts.
    pub fn add(&mut self, action: A) -> bool {
        // arrival order is canonical when the category never sorts
        if self.sorted && self.requires_sorting {
            if self.sorter.is_some() {
                // the sorter is opaque, so any addition may break its order
                self.sorted = false;
            } else if let Some(last) = self.actions.last() {
                if natural_order(last, &action).is_gt() {
                    self.sorted = false;
                }
            }
        }

        if let Some(spaces) = self.spaces.get_mut() {
            spaces.extend(action.affected_spaces().iter().cloned());
        }

        self.actions.push(action);
        true
    }

    /// Bring the actions into canonical order (no-op when already sorted)
    pub fn sort(&mut self) {
        if self.sorted || !self.requires_sorting {
            return;
        }

        match &self.sorter {
            Some(sorter) => sorter.sort(&mut self.actions),
            None => self.actions.sort_by(|a, b| natural_order(a, b)),
        }
        self.sorted = true;
    }

    /// Union of the storage spaces of all contained actions
    pub fn spaces(&self) -> &BTreeSet<String> {
        self.spaces.get_or_init(|| {
            self.actions
                .iter()
                .flat_map(|action| action.affected_spaces().iter().cloned())
                .collect()
        })
    }

    pub fn remove(&mut self, index: usize) -> Option<A> {
        if index >= self.actions.len() {
            return None;
        }
        let action = self.actions.remove(index);
        // another action may still contribute the same spaces; recompute later
        if !action.affected_spaces().is_empty() {
            self.spaces.take();
        }
        Some(action)
    }

    /// Drop the `n` most recently added actions
    pub fn remove_last_n(&mut self, n: usize) {
        let keep = self.actions.len().saturating_sub(n);
        let removed = self.actions.split_off(keep);
        if removed.iter().any(|action| !action.affected_spaces().is_empty()) {
            self.spaces.take();
        }
    }

    pub fn clear(&mut self) {
        self.actions.clear();
        self.spaces.take();
        self.sorted = !self.requires_sorting;
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn get(&self, index: usize) -> Option<&A> {
        self.actions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, A> {
        self.actions.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, A> {
        self.actions.iter_mut()
    }

    pub(crate) fn actions(&self) -> &[A] {
        &self.actions
    }

    /// Cached space set, if materialized
    pub(crate) fn cached_spaces(&self) -> Option<&BTreeSet<String>> {
        self.spaces.get()
    }

    /// Rebuild a container from its persisted parts
    pub(crate) fn restore(
        &mut self,
        sorted: bool,
        spaces: Option<BTreeSet<String>>,
        actions: Vec<A>,
    ) {
        self.actions = actions;
        self.sorted = sorted;
        self.spaces = OnceCell::new();
        if let Some(spaces) = spaces {
            let _ = self.spaces.set(spaces);
        }
    }
}

impl<A: fmt::Debug> fmt::Debug for ExecutableList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableList")
            .field("actions", &self.actions)
            .field("sorted", &self.sorted)
            .field("custom_sorter", &self.sorter.is_some())
            .finish()
    }
}

impl<'a, A> IntoIterator for &'a ExecutableList<A> {
    type Item = &'a A;
    type IntoIter = std::slice::Iter<'a, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
