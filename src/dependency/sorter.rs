//! Insert regrouping: batch same-type inserts without breaking FK order
//!
//! The incoming order is cascade order, which already respects the
//! direction of foreign keys. The sorter groups inserts of one entity type
//! together (so statement batching can kick in) while never moving an insert
//! in front of another insert it transitively depends on.
//!
//! ## Algorithm
//!
//! 1. Build the insert dependency graph (`InsertGraph`)
//! 2. Bucket inserts by entity type, in first-appearance order
//! 3. Repeatedly schedule every group whose dependency types are all scheduled
//! 4. Append whatever is left (type-level cycle) in original order and warn
//!
//! The regrouping is best effort. A cyclic batch keeps its original order,
//! which is only correct at the store if the constraints are deferred.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{trace, warn};

use super::graph::InsertGraph;
use crate::metrics::metrics_api;
use crate::queue::action::Action;
use crate::queue::executable::Sorter;

/// All inserts of one entity type
#[derive(Debug, Clone)]
struct EntityInsertGroup {
    entity_name: String,
    /// Handles in original relative order
    members: Vec<usize>,
    /// Other entity types any member transitively depends on
    depends_on: BTreeSet<String>,
}

/// Result of one sort call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortOutcome {
    pub scheduled_groups: usize,
    /// Inserts appended in original order because of a type-level cycle
    pub unscheduled_actions: usize,
}

impl SortOutcome {
    pub fn is_complete(&self) -> bool {
        self.unscheduled_actions == 0
    }
}

/// Custom sorter installed on the insert container
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertActionSorter;

impl<A: Action> Sorter<A> for InsertActionSorter {
    fn sort(&self, actions: &mut Vec<A>) {
        sort_inserts(actions);
    }
}

/// Reorder a batch of inserts in place
pub fn sort_inserts<A: Action>(actions: &mut Vec<A>) -> SortOutcome {
    let outcome = schedule_inserts(actions);
    metrics_api::record_insert_sort(!outcome.is_complete());
    outcome
}

fn schedule_inserts<A: Action>(actions: &mut Vec<A>) -> SortOutcome {
    if actions.len() < 2 {
        return SortOutcome {
            scheduled_groups: usize::from(!actions.is_empty()),
            unscheduled_actions: 0,
        };
    }

    let mut graph = InsertGraph::build(actions);
    let mut groups = group_by_entity(actions, &graph);

    let mut order: Vec<usize> = (0..graph.len()).collect();
    let mut scheduled: HashSet<String> = HashSet::with_capacity(groups.len());
    let mut position = 0;
    let mut scheduled_groups = 0;

    loop {
        let before = scheduled.len();
        groups.retain(|group| {
            if !group.depends_on.iter().all(|name| scheduled.contains(name)) {
                return true;
            }
            position = schedule(&mut order, &mut graph, &group.members, position);
            scheduled.insert(group.entity_name.clone());
            scheduled_groups += 1;
            trace!(entity = %group.entity_name, inserts = group.members.len(), "scheduled insert group");
            false
        });
        if scheduled.len() == before {
            break;
        }
    }

    let unscheduled_actions: usize = groups.iter().map(|group| group.members.len()).sum();
    if unscheduled_actions > 0 {
        // the unscheduled tail is still in original relative order
        warn!(
            batch_size = actions.len(),
            "The batch containing {} statements could not be sorted. \
             This might indicate a circular entity relationship.",
            actions.len()
        );
    }

    apply_order(actions, &order);

    SortOutcome {
        scheduled_groups,
        unscheduled_actions,
    }
}

fn group_by_entity<A: Action>(actions: &[A], graph: &InsertGraph) -> Vec<EntityInsertGroup> {
    let mut groups: Vec<EntityInsertGroup> = Vec::new();
    let mut by_name: HashMap<&str, usize> = HashMap::new();

    for (handle, action) in actions.iter().enumerate() {
        let name = action.entity_name();
        let slot = *by_name.entry(name).or_insert_with(|| {
            groups.push(EntityInsertGroup {
                entity_name: name.to_string(),
                members: Vec::new(),
                depends_on: BTreeSet::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.members.push(handle);
        for &dependency in &graph.infos[handle].incoming {
            let dependency_name = actions[dependency].entity_name();
            if dependency_name != name {
                group.depends_on.insert(dependency_name.to_string());
            }
        }
    }

    groups
}

/// Move `members` to `start..` and shift the rest of the unscheduled tail
/// behind them, keeping its relative order. Returns the next free position.
fn schedule(order: &mut [usize], graph: &mut InsertGraph, members: &[usize], start: usize) -> usize {
    let end = start + members.len();
    if members.iter().all(|&m| (start..end).contains(&graph.infos[m].index)) {
        return end;
    }

    let mut placed = vec![false; order.len()];
    for &member in members {
        placed[member] = true;
    }
    let shifted: Vec<usize> = order[start..].iter().copied().filter(|&h| !placed[h]).collect();

    for (offset, &handle) in members.iter().chain(shifted.iter()).enumerate() {
        order[start + offset] = handle;
        graph.infos[handle].index = start + offset;
    }

    end
}

fn apply_order<A>(actions: &mut Vec<A>, order: &[usize]) {
    let mut slots: Vec<Option<A>> = std::mem::take(actions).into_iter().map(Some).collect();
    actions.extend(order.iter().filter_map(|&handle| slots[handle].take()));
}
