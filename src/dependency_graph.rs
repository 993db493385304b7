/// Dependency graph analysis for signal sampling
///
/// This module analyzes the signals of a snapshot to determine:
/// - Sampling weights (how often a signal is required by others)
/// - Execution order (dependencies before dependents)
/// - Cycle detection (invalid snapshots)
use crate::cancellation::CancellationToken;
use crate::error::{EvaluatorError, EvaluatorResult};
use crate::signal_data::{Signal, SignalId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Represents the signal dependency graph of one snapshot
///
/// # Graph Structure
/// - Nodes: Signals (meanders, differences, ...)
/// - Edges: Dependencies (data flows from dependency → dependent)
///
/// # Usage
/// ```ignore
/// let graph = DependencyGraph::build(&signals);
/// let weights = graph.resolve_weights(&token)?;  // CyclicDependency on cycles
/// let order = graph.execution_order(&weights);   // dependencies first
/// ```
pub struct DependencyGraph {
    /// Directed graph of signal dependencies
    graph: DiGraph<SignalId, ()>,

    /// Map SignalId → NodeIndex for graph operations
    node_map: HashMap<SignalId, NodeIndex>,

    /// (dependent, missing dependency) pairs found while building
    unresolved: Vec<(SignalId, SignalId)>,
}

impl DependencyGraph {
    /// Build dependency graph from a snapshot's signals
    ///
    /// Never fails: a dependency id missing from `signals` is logged and
    /// recorded in [`DependencyGraph::unresolved`], and the dependent later
    /// reads zeros in its place. Duplicate ids keep the first occurrence.
    pub fn build(signals: &[Signal]) -> Self {
        let mut graph = DiGraph::with_capacity(signals.len(), signals.len());
        let mut node_map = HashMap::with_capacity(signals.len());
        let mut unresolved = Vec::new();

        // Add all signals to graph
        for signal in signals {
            if node_map.contains_key(&signal.id) {
                warn!(signal = %signal.id, "duplicate signal id, keeping first definition");
                continue;
            }
            let idx = graph.add_node(signal.id);
            node_map.insert(signal.id, idx);
        }

        // Add edges for dependencies
        let mut wired = HashSet::with_capacity(signals.len());
        for signal in signals {
            if !wired.insert(signal.id) {
                continue;
            }
            let dependent_idx = node_map[&signal.id];

            for dep_id in signal.data.dependencies() {
                if let Some(&dep_idx) = node_map.get(dep_id) {
                    // Edge: dependency → dependent (data flows this direction)
                    graph.add_edge(dep_idx, dependent_idx, ());
                } else {
                    warn!(signal = %signal.id, dependency = %dep_id, "unknown signal dependency");
                    unresolved.push((signal.id, *dep_id));
                }
            }
        }

        Self {
            graph,
            node_map,
            unresolved,
        }
    }

    /// Count how often each signal has to be resolved before another one
    ///
    /// Visiting every signal depth-first as a root and bumping a dependency
    /// each time it is reached gives
    /// `weight(D) = sum over dependents X of (1 + weight(X))`, which is what
    /// this computes, memoized. For every edge `D → X` the result satisfies
    /// `weight(D) >= weight(X) + 1`.
    ///
    /// # Errors
    /// - `CyclicDependency(id)` if `id` is reached again while still on the
    ///   current visiting path
    /// - `Cancelled` if `cancellation` fires (polled once per edge)
    pub fn resolve_weights(
        &self,
        cancellation: &CancellationToken,
    ) -> EvaluatorResult<HashMap<SignalId, usize>> {
        let mut weights: Vec<Option<usize>> = vec![None; self.graph.node_count()];
        let mut visiting = HashSet::new();

        for root in self.graph.node_indices() {
            self.visit(root, &mut weights, &mut visiting, cancellation)?;
        }

        cancellation.check()?;
        Ok(self
            .graph
            .node_indices()
            .map(|idx| (self.graph[idx], weights[idx.index()].unwrap_or(0)))
            .collect())
    }

    fn visit(
        &self,
        idx: NodeIndex,
        weights: &mut [Option<usize>],
        visiting: &mut HashSet<NodeIndex>,
        cancellation: &CancellationToken,
    ) -> EvaluatorResult<usize> {
        if let Some(weight) = weights[idx.index()] {
            return Ok(weight);
        }
        if !visiting.insert(idx) {
            return Err(EvaluatorError::CyclicDependency(self.graph[idx]));
        }

        let mut weight = 0usize;
        for dependent_idx in self.graph.neighbors_directed(idx, Direction::Outgoing) {
            cancellation.check()?;
            let dependent = self.visit(dependent_idx, weights, visiting, cancellation)?;
            weight = weight.saturating_add(dependent.saturating_add(1));
        }

        visiting.remove(&idx);
        weights[idx.index()] = Some(weight);
        Ok(weight)
    }

    /// Signals sorted so that every dependency precedes its dependents
    ///
    /// Heavier signals are required by more others and come first; ties are
    /// broken by id so the order is deterministic.
    pub fn execution_order(&self, weights: &HashMap<SignalId, usize>) -> Vec<SignalId> {
        let mut order: Vec<SignalId> = self.graph.node_weights().copied().collect();
        order.sort_by(|a, b| {
            let wa = weights.get(a).copied().unwrap_or(0);
            let wb = weights.get(b).copied().unwrap_or(0);
            wb.cmp(&wa).then_with(|| a.cmp(b))
        });
        order
    }

    /// Get all direct dependencies of a signal
    pub fn dependencies(&self, id: SignalId) -> Vec<SignalId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Get all signals that depend directly on this signal
    pub fn dependents(&self, id: SignalId) -> Vec<SignalId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: SignalId, direction: Direction) -> Vec<SignalId> {
        if let Some(&idx) = self.node_map.get(&id) {
            self.graph
                .neighbors_directed(idx, direction)
                .map(|other| self.graph[other])
                .collect()
        } else {
            vec![]
        }
    }

    /// Dependencies that were referenced but not present in the snapshot
    pub fn unresolved(&self) -> &[(SignalId, SignalId)] {
        &self.unresolved
    }

    /// true if graph is acyclic (valid), false if cycle detected
    pub fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.graph)
    }

    pub fn signal_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Get all source signals (signals with no dependencies)
    pub fn source_signals(&self) -> Vec<SignalId> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal_data::SignalData;

    fn ids(n: usize) -> Vec<SignalId> {
        (0..n).map(|_| SignalId::new_v4()).collect()
    }

    fn meander(id: SignalId) -> Signal {
        Signal::new(id, SignalData::meander([0.0, 1.0]))
    }

    fn difference(id: SignalId, a: SignalId, b: SignalId) -> Signal {
        Signal::new(id, SignalData::difference(a, b))
    }

    fn position(order: &[SignalId], id: SignalId) -> usize {
        order.iter().position(|&x| x == id).unwrap()
    }

    #[test]
    fn test_simple_chain() {
        // Graph: A, B → C → D (D = C - A)
        let id = ids(4);
        let signals = vec![
            difference(id[3], id[2], id[0]),
            difference(id[2], id[0], id[1]),
            meander(id[0]),
            meander(id[1]),
        ];

        let graph = DependencyGraph::build(&signals);
        let weights = graph.resolve_weights(&CancellationToken::new()).unwrap();
        let order = graph.execution_order(&weights);

        assert!(graph.is_acyclic());
        assert_eq!(order.len(), 4);
        assert!(position(&order, id[0]) < position(&order, id[2]));
        assert!(position(&order, id[1]) < position(&order, id[2]));
        assert!(position(&order, id[2]) < position(&order, id[3]));
        // Visit counts: D is required by nobody, A through C and D
        assert_eq!(weights[&id[3]], 0);
        assert_eq!(weights[&id[2]], 1);
        assert_eq!(weights[&id[1]], 2);
        assert_eq!(weights[&id[0]], 3);
    }

    #[test]
    fn test_weights_dominate_dependents() {
        // Graph:
        //   A → C → E
        //   B → D → E
        let id = ids(5);
        let signals = vec![
            meander(id[0]),
            meander(id[1]),
            difference(id[2], id[0], id[0]),
            difference(id[3], id[1], id[1]),
            difference(id[4], id[2], id[3]),
        ];

        let graph = DependencyGraph::build(&signals);
        let weights = graph.resolve_weights(&CancellationToken::new()).unwrap();

        for signal in &signals {
            for dep in signal.data.dependencies() {
                assert!(weights[dep] > weights[&signal.id]);
            }
        }
    }

    #[test]
    fn test_cycle_detection() {
        // A = B - B, B = A - A
        let id = ids(2);
        let signals = vec![
            difference(id[0], id[1], id[1]),
            difference(id[1], id[0], id[0]),
        ];

        let graph = DependencyGraph::build(&signals);
        assert!(!graph.is_acyclic());

        match graph.resolve_weights(&CancellationToken::new()) {
            Err(EvaluatorError::CyclicDependency(cycle_id)) => assert!(id.contains(&cycle_id)),
            other => panic!("expected cyclic dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let id = ids(2);
        let signals = vec![meander(id[0]), difference(id[1], id[1], id[0])];

        let graph = DependencyGraph::build(&signals);
        assert!(matches!(
            graph.resolve_weights(&CancellationToken::new()),
            Err(EvaluatorError::CyclicDependency(x)) if x == id[1]
        ));
    }

    #[test]
    fn test_unresolved_dependency_is_not_fatal() {
        let id = ids(3);
        let missing = id[2];
        let signals = vec![meander(id[0]), difference(id[1], id[0], missing)];

        let graph = DependencyGraph::build(&signals);
        assert_eq!(graph.unresolved(), &[(id[1], missing)]);
        assert_eq!(graph.edge_count(), 1);

        let weights = graph.resolve_weights(&CancellationToken::new()).unwrap();
        assert_eq!(weights[&id[0]], 1);
        assert!(!weights.contains_key(&missing));
    }

    #[test]
    fn test_cancelled_resolution() {
        let id = ids(2);
        let signals = vec![meander(id[0]), difference(id[1], id[0], id[0])];
        let graph = DependencyGraph::build(&signals);

        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            graph.resolve_weights(&token),
            Err(EvaluatorError::Cancelled)
        ));
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let id = ids(3);
        let signals = vec![
            meander(id[0]),
            meander(id[1]),
            difference(id[2], id[0], id[1]),
        ];

        let graph = DependencyGraph::build(&signals);

        let mut deps = graph.dependencies(id[2]);
        deps.sort();
        let mut expected = vec![id[0], id[1]];
        expected.sort();
        assert_eq!(deps, expected);

        assert_eq!(graph.dependents(id[0]), vec![id[2]]);
        assert!(graph.dependents(id[2]).is_empty());

        let mut sources = graph.source_signals();
        sources.sort();
        assert_eq!(sources, expected);
        assert_eq!(graph.signal_count(), 3);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let id = ids(1);
        let signals = vec![meander(id[0]), difference(id[0], id[0], id[0])];

        let graph = DependencyGraph::build(&signals);
        assert_eq!(graph.signal_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.is_acyclic());
    }
}
