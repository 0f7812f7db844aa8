// Copyright © 2024 Pathway

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use log::trace;

use super::scc::topological_sort;
use super::{BiDirectionalGraphDataSource, GraphNode};
use crate::engine::Direction;

/// A change of the transitive closure relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcChange<V> {
    pub source: V,
    pub target: V,
    pub direction: Direction,
}

/// Transitive closure tuples with their derivation counts.
#[derive(Debug, Clone)]
struct CountingTcRelation<V: GraphNode> {
    forward: HashMap<V, IndexMap<V, usize>>,
    backward: HashMap<V, IndexSet<V>>,
}

impl<V: GraphNode> Default for CountingTcRelation<V> {
    fn default() -> Self {
        Self {
            forward: HashMap::new(),
            backward: HashMap::new(),
        }
    }
}

impl<V: GraphNode> CountingTcRelation<V> {
    /// Adjusts the derivation count of the tuple by one.
    /// Returns `true` iff the count changed from or to zero.
    fn update_tuple(&mut self, source: &V, target: &V, direction: Direction) -> bool {
        match direction {
            Direction::Insert => {
                let count = self
                    .forward
                    .entry(source.clone())
                    .or_default()
                    .entry(target.clone())
                    .or_default();
                *count += 1;
                if *count == 1 {
                    self.backward
                        .entry(target.clone())
                        .or_default()
                        .insert(source.clone());
                    true
                } else {
                    false
                }
            }
            Direction::Delete => {
                let Some(targets) = self.forward.get_mut(source) else {
                    panic!("transitive closure tuple ({source:?}, {target:?}) has no derivation");
                };
                let Some(count) = targets.get_mut(target) else {
                    panic!("transitive closure tuple ({source:?}, {target:?}) has no derivation");
                };
                *count -= 1;
                if *count > 0 {
                    return false;
                }
                targets.shift_remove(target);
                if targets.is_empty() {
                    self.forward.remove(source);
                }
                if let Some(sources) = self.backward.get_mut(target) {
                    sources.shift_remove(source);
                    if sources.is_empty() {
                        self.backward.remove(target);
                    }
                }
                true
            }
        }
    }

    fn contains(&self, source: &V, target: &V) -> bool {
        self.forward
            .get(source)
            .is_some_and(|targets| targets.contains_key(target))
    }

    fn count(&self, source: &V, target: &V) -> usize {
        self.forward
            .get(source)
            .and_then(|targets| targets.get(target))
            .copied()
            .unwrap_or(0)
    }

    fn targets(&self, source: &V) -> impl Iterator<Item = &V> + '_ {
        self.forward
            .get(source)
            .into_iter()
            .flat_map(IndexMap::keys)
    }

    fn sources(&self, target: &V) -> impl Iterator<Item = &V> + '_ {
        self.backward.get(target).into_iter().flatten()
    }

    fn delete_tuple_end(&mut self, node: &V) {
        if let Some(targets) = self.forward.remove(node) {
            for target in targets.keys() {
                if let Some(sources) = self.backward.get_mut(target) {
                    sources.shift_remove(node);
                    if sources.is_empty() {
                        self.backward.remove(target);
                    }
                }
            }
        }
        if let Some(sources) = self.backward.remove(node) {
            for source in &sources {
                if let Some(targets) = self.forward.get_mut(source) {
                    targets.shift_remove(node);
                    if targets.is_empty() {
                        self.forward.remove(source);
                    }
                }
            }
        }
    }
}

/// Counting algorithm for the transitive closure of an acyclic graph.
///
/// Each tuple `(x, y)` stores how many ways it can be derived: once for a direct edge, plus
/// once for every successor `z` of `x` with `(z, y)` in the closure. Only distinct edges count,
/// so the caller reports an edge when its multiplicity becomes positive and when it drops
/// back to zero.
#[derive(Debug, Clone)]
pub struct CountingAlg<V: GraphNode> {
    tc: CountingTcRelation<V>,
}

impl<V: GraphNode> CountingAlg<V> {
    pub fn new(graph: &impl BiDirectionalGraphDataSource<V>) -> Self {
        let mut tc = CountingTcRelation::default();
        let order = topological_sort(graph.all_nodes().cloned(), |node: &V| {
            graph
                .target_nodes(node)
                .map(|(target, _)| target.clone())
                .collect::<Vec<_>>()
        });
        for node in order.iter().rev() {
            let ends: Vec<V> = tc.targets(node).cloned().collect();
            for (source, _) in graph.source_nodes(node) {
                if source == node {
                    continue;
                }
                tc.update_tuple(source, node, Direction::Insert);
                for end in &ends {
                    tc.update_tuple(source, end, Direction::Insert);
                }
            }
        }
        Self { tc }
    }

    pub fn is_reachable(&self, source: &V, target: &V) -> bool {
        self.tc.contains(source, target)
    }

    /// Number of derivations of the tuple.
    pub fn derivation_count(&self, source: &V, target: &V) -> usize {
        self.tc.count(source, target)
    }

    pub fn reachable_targets(&self, source: &V) -> impl Iterator<Item = &V> + '_ {
        self.tc.targets(source)
    }

    pub fn reachable_sources(&self, target: &V) -> impl Iterator<Item = &V> + '_ {
        self.tc.sources(target)
    }

    pub fn edge_inserted(
        &mut self,
        graph: &impl BiDirectionalGraphDataSource<V>,
        source: &V,
        target: &V,
        changes: &mut Vec<TcChange<V>>,
    ) {
        if source != target {
            self.derive(graph, source, target, Direction::Insert, changes);
        }
    }

    pub fn edge_deleted(
        &mut self,
        graph: &impl BiDirectionalGraphDataSource<V>,
        source: &V,
        target: &V,
        changes: &mut Vec<TcChange<V>>,
    ) {
        if source != target {
            self.derive(graph, source, target, Direction::Delete, changes);
        }
    }

    pub fn node_deleted(&mut self, node: &V) {
        self.tc.delete_tuple_end(node);
    }

    fn record(
        &mut self,
        source: &V,
        target: &V,
        direction: Direction,
        delta: &mut Vec<(V, V)>,
        changes: &mut Vec<TcChange<V>>,
    ) {
        if self.tc.update_tuple(source, target, direction) {
            delta.push((source.clone(), target.clone()));
            changes.push(TcChange {
                source: source.clone(),
                target: target.clone(),
                direction,
            });
        }
    }

    fn derive(
        &mut self,
        graph: &impl BiDirectionalGraphDataSource<V>,
        source: &V,
        target: &V,
        direction: Direction,
        changes: &mut Vec<TcChange<V>>,
    ) {
        let mut delta = Vec::new();

        // d(tc(x, y)) :- d(edge(x, y))
        self.record(source, target, direction, &mut delta, changes);

        // d(tc(x, y)) :- d(edge(x, z)), tc(z, y)
        let ends: Vec<V> = self.tc.targets(target).cloned().collect();
        for end in &ends {
            if end != source {
                self.record(source, end, direction, &mut delta, changes);
            }
        }

        // d(tc(x, y)) :- edge(x, z), d(tc(z, y))
        let mut rounds = 0;
        while !delta.is_empty() {
            rounds += 1;
            let mut next_delta = Vec::new();
            for (start, end) in &delta {
                let predecessors: Vec<V> = graph
                    .source_nodes(start)
                    .map(|(predecessor, _)| predecessor.clone())
                    .collect();
                for predecessor in &predecessors {
                    if predecessor != end {
                        self.record(predecessor, end, direction, &mut next_delta, changes);
                    }
                }
            }
            delta = next_delta;
        }
        trace!("transitive closure of edge ({source:?}, {target:?}) settled after {rounds} rounds");
    }
}
