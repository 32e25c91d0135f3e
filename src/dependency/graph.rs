use std::collections::{BTreeSet, HashMap};

use crate::queue::action::{Action, PropertyValue};
use crate::queue::key::InstanceId;

/// Per-flush dependency record of one insert
///
/// Handles are positions in the original (cascade) order of the batch.
#[derive(Debug, Clone, Default)]
pub struct InsertInfo {
    /// Inserts that must run before this one (transitively closed after `build`)
    pub incoming: BTreeSet<usize>,
    /// Inserts that must wait on this one (reversed edge direction)
    pub outgoing: BTreeSet<usize>,
    /// Current position in the schedule array
    pub index: usize,
}

/// Insert dependency graph over one batch of insert actions
///
/// Example, cascade order `[Order#2 -> Customer#7, Customer#7]`:
/// - info 0 (`Order#2`) has incoming `{1}`
/// - info 1 (`Customer#7`) has no dependencies
#[derive(Debug, Clone)]
pub struct InsertGraph {
    pub infos: Vec<InsertInfo>,
    by_instance: HashMap<InstanceId, usize>,
}

impl InsertGraph {
    pub fn build<A: Action>(actions: &[A]) -> Self {
        let mut graph = Self {
            infos: (0..actions.len())
                .map(|index| InsertInfo {
                    index,
                    ..InsertInfo::default()
                })
                .collect(),
            by_instance: HashMap::with_capacity(actions.len()),
        };

        for (handle, action) in actions.iter().enumerate() {
            if let Some(instance) = action.instance() {
                graph.by_instance.insert(instance, handle);
            }
        }

        // direct dependencies
        for (handle, action) in actions.iter().enumerate() {
            let mut incoming = BTreeSet::new();
            let mut outgoing = BTreeSet::new();
            for property in action.properties() {
                graph.collect_direct(handle, &property.value, &mut incoming, &mut outgoing);
            }
            graph.infos[handle].incoming = incoming;
            graph.infos[handle].outgoing = outgoing;
        }

        // outgoing A -> B becomes "B depends on A"
        for handle in 0..graph.infos.len() {
            let outgoing: Vec<usize> = graph.infos[handle].outgoing.iter().copied().collect();
            for child in outgoing {
                graph.infos[child].incoming.insert(handle);
            }
        }

        graph.close_transitively();
        graph
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Handle of the insert writing `instance`, if it is part of the batch
    pub fn handle_of(&self, instance: InstanceId) -> Option<usize> {
        self.by_instance.get(&instance).copied()
    }

    fn collect_direct(
        &self,
        handle: usize,
        value: &PropertyValue,
        incoming: &mut BTreeSet<usize>,
        outgoing: &mut BTreeSet<usize>,
    ) {
        match value {
            PropertyValue::Basic => {}
            PropertyValue::Entity {
                target,
                to_parent_unique_key,
                ..
            } => {
                if let Some(dependency) = self.handle_of(*target).filter(|&d| d != handle) {
                    if *to_parent_unique_key {
                        outgoing.insert(dependency);
                    } else {
                        incoming.insert(dependency);
                    }
                }
            }
            PropertyValue::OneToMany { elements } => {
                // mapped-by elements carry the FK to this owner
                for element in elements {
                    if let Some(dependency) = self.handle_of(*element).filter(|&d| d != handle) {
                        outgoing.insert(dependency);
                    }
                }
            }
            PropertyValue::Component(properties) => {
                for property in properties {
                    self.collect_direct(handle, &property.value, incoming, outgoing);
                }
            }
        }
    }

    /// Replace each incoming set by its transitive closure.
    ///
    /// Depth-first walk over the direct edges with a visited guard; a cycle
    /// stops expanding once every reachable node has been seen.
    fn close_transitively(&mut self) {
        let direct: Vec<Vec<usize>> = self
            .infos
            .iter()
            .map(|info| info.incoming.iter().copied().collect())
            .collect();

        let mut visited = vec![false; direct.len()];
        let mut stack = Vec::new();
        for (handle, info) in self.infos.iter_mut().enumerate() {
            visited.iter_mut().for_each(|v| *v = false);
            let mut closure = BTreeSet::new();

            stack.extend(direct[handle].iter().copied());
            while let Some(next) = stack.pop() {
                if visited[next] {
                    continue;
                }
                visited[next] = true;
                if next != handle {
                    closure.insert(next);
                }
                stack.extend(direct[next].iter().copied().filter(|&d| !visited[d]));
            }

            info.incoming = closure;
        }
    }
}
