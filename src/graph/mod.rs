//! Dependency graph and scheduler
//!
//! Nodes are signal ids in definition insertion order; an edge `B -> A` means
//! A reads B's result (`OneD { derived: B }`). Edges therefore point from a
//! dependency to its dependents, so a topological order is a valid evaluation
//! order and outgoing edges are the cascade direction.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use thiserror::Error;
use tracing::debug;

use crate::signal::{SignalDefinition, SignalId};

/// Raised when the graph cannot be fully ordered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle blocks {} signal(s): {}", .cyclic.len(), join_ids(.cyclic))]
pub struct CycleError {
    /// Signals that could still be ordered, in evaluation order.
    pub ordered: Vec<SignalId>,
    /// Signals on a cycle or downstream of one, in insertion order.
    pub cyclic: Vec<SignalId>,
}

fn join_ids(ids: &[SignalId]) -> String {
    ids.iter().map(SignalId::as_str).collect::<Vec<_>>().join(", ")
}

/// Directed dependency graph over the current definitions.
#[derive(Debug, Clone, Default)]
pub struct ComputationGraph {
    graph: DiGraph<SignalId, ()>,
    index: HashMap<SignalId, NodeIndex>,
}

impl ComputationGraph {
    /// Build the graph. References to unknown signals add no edge.
    pub fn from_definitions<'a, I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = &'a SignalDefinition>,
    {
        let definitions: Vec<&SignalDefinition> = definitions.into_iter().collect();
        let mut graph = DiGraph::with_capacity(definitions.len(), definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for definition in &definitions {
            let node = graph.add_node(definition.id.clone());
            index.insert(definition.id.clone(), node);
        }

        for definition in &definitions {
            let dependent = index[&definition.id];
            for dependency in definition.dependencies() {
                match index.get(&dependency) {
                    Some(&upstream) => {
                        graph.add_edge(upstream, dependent, ());
                    }
                    None => debug!(
                        signal_id = %definition.id,
                        dependency = %dependency,
                        "derived reference to unknown signal"
                    ),
                }
            }
        }

        Self { graph, index }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &SignalId) -> bool {
        self.index.contains_key(id)
    }

    /// Evaluation order via Kahn's algorithm; ties go to the earlier definition.
    pub fn computation_order(&self) -> Result<Vec<SignalId>, CycleError> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut ordered = Vec::with_capacity(self.len());
        while let Some(Reverse(i)) = ready.pop() {
            let node = NodeIndex::new(i);
            ordered.push(self.graph[node].clone());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let d = &mut in_degree[next.index()];
                *d -= 1;
                if *d == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        if ordered.len() == self.len() {
            return Ok(ordered);
        }

        let cyclic = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] > 0)
            .map(|n| self.graph[n].clone())
            .collect();
        Err(CycleError { ordered, cyclic })
    }

    /// Signals that read `id` directly.
    pub fn dependents_of(&self, id: &SignalId) -> Vec<SignalId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Signals `id` reads directly.
    pub fn dependencies_of(&self, id: &SignalId) -> Vec<SignalId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &SignalId, direction: Direction) -> Vec<SignalId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(node, direction).collect();
        found.sort();
        found.dedup();
        found.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// `id` followed by every transitive dependent, breadth first.
    ///
    /// An id not in the graph still yields itself.
    pub fn cascade_invalidate(&self, id: &SignalId) -> Vec<SignalId> {
        let mut affected = vec![id.clone()];
        let Some(&start) = self.index.get(id) else {
            return affected;
        };

        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let mut next: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .collect();
            next.sort();
            for dependent in next {
                if seen.insert(dependent) {
                    affected.push(self.graph[dependent].clone());
                    queue.push_back(dependent);
                }
            }
        }
        affected
    }

    /// A cycle passing through `id`, as `[id, .., id]` in data-flow order.
    pub fn cycle_through(&self, id: &SignalId) -> Option<Vec<SignalId>> {
        let &start = self.index.get(id)?;

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if next == start {
                    let mut path = vec![self.graph[start].clone()];
                    let mut cursor = node;
                    loop {
                        path.push(self.graph[cursor].clone());
                        if cursor == start {
                            break;
                        }
                        cursor = parent[&cursor];
                    }
                    path.reverse();
                    return Some(path);
                }
                if let std::collections::hash_map::Entry::Vacant(slot) = parent.entry(next) {
                    slot.insert(node);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Ids of every node that sits on a cycle, in insertion order.
    pub fn nodes_on_cycles(&self) -> Vec<SignalId> {
        let mut on_cycle: Vec<NodeIndex> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .collect();
        on_cycle.sort();
        on_cycle.into_iter().map(|n| self.graph[n].clone()).collect()
    }
}
