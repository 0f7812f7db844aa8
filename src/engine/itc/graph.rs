// Copyright © 2024 Pathway

use std::cell::RefCell;
use std::rc::Rc;

use derivative::Derivative;
use indexmap::{IndexMap, IndexSet};

use super::{
    BiDirectionalGraphDataSource, GraphDataSource, GraphNode, GraphObserver, ObserverHandle,
    Observers,
};

/// Forward and backward adjacency of a multigraph, without any observers.
#[derive(Derivative)]
#[derivative(Default(bound = ""), Debug(bound = ""), Clone(bound = ""))]
pub struct Adjacency<V: GraphNode> {
    nodes: IndexSet<V>,
    outgoing: IndexMap<V, IndexMap<V, usize>>,
    incoming: IndexMap<V, IndexMap<V, usize>>,
}

impl<V: GraphNode> Adjacency<V> {
    pub fn contains_node(&self, node: &V) -> bool {
        self.nodes.contains(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `false` if the node was already present.
    pub fn insert_node(&mut self, node: V) -> bool {
        self.nodes.insert(node)
    }

    /// Removes an isolated node. Returns `false` if the node was not present.
    pub fn remove_node(&mut self, node: &V) -> bool {
        debug_assert!(
            self.outgoing.get(node).is_none_or(IndexMap::is_empty)
                && self.incoming.get(node).is_none_or(IndexMap::is_empty),
            "removing node {node:?} that still has edges"
        );
        self.outgoing.shift_remove(node);
        self.incoming.shift_remove(node);
        self.nodes.shift_remove(node)
    }

    /// Adds `multiplicity` parallel edges and returns the new multiplicity.
    /// Missing endpoints are inserted.
    pub fn insert_edge_with_multiplicity(
        &mut self,
        source: &V,
        target: &V,
        multiplicity: usize,
    ) -> usize {
        self.nodes.insert(source.clone());
        self.nodes.insert(target.clone());
        *self
            .incoming
            .entry(target.clone())
            .or_default()
            .entry(source.clone())
            .or_default() += multiplicity;
        let count = self
            .outgoing
            .entry(source.clone())
            .or_default()
            .entry(target.clone())
            .or_default();
        *count += multiplicity;
        *count
    }

    pub fn insert_edge(&mut self, source: &V, target: &V) -> usize {
        self.insert_edge_with_multiplicity(source, target, 1)
    }

    /// Removes one edge and returns the remaining multiplicity, or `None` if there was no edge.
    pub fn delete_edge(&mut self, source: &V, target: &V) -> Option<usize> {
        let remaining = Self::decrement(&mut self.outgoing, source, target)?;
        let backward = Self::decrement(&mut self.incoming, target, source);
        debug_assert_eq!(backward, Some(remaining));
        Some(remaining)
    }

    /// Removes every parallel edge between the two nodes, returning how many there were.
    pub fn delete_all_edges(&mut self, source: &V, target: &V) -> usize {
        let removed = Self::remove_all(&mut self.outgoing, source, target);
        Self::remove_all(&mut self.incoming, target, source);
        removed
    }

    fn decrement(
        lookup: &mut IndexMap<V, IndexMap<V, usize>>,
        key: &V,
        value: &V,
    ) -> Option<usize> {
        let bucket = lookup.get_mut(key)?;
        let count = bucket.get_mut(value)?;
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            bucket.shift_remove(value);
            if bucket.is_empty() {
                lookup.shift_remove(key);
            }
        }
        Some(remaining)
    }

    fn remove_all(lookup: &mut IndexMap<V, IndexMap<V, usize>>, key: &V, value: &V) -> usize {
        let Some(bucket) = lookup.get_mut(key) else {
            return 0;
        };
        let removed = bucket.shift_remove(value).unwrap_or(0);
        if bucket.is_empty() {
            lookup.shift_remove(key);
        }
        removed
    }

    pub fn self_loop_count(&self, node: &V) -> usize {
        self.edge_count(node, node)
    }

    pub fn has_edges(&self, node: &V) -> bool {
        self.outgoing.contains_key(node) || self.incoming.contains_key(node)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&V, &V, usize)> + '_ {
        self.outgoing.iter().flat_map(|(source, targets)| {
            targets
                .iter()
                .map(move |(target, count)| (source, target, *count))
        })
    }
}

impl<V: GraphNode> GraphDataSource<V> for Adjacency<V> {
    fn all_nodes(&self) -> impl Iterator<Item = &V> + '_ {
        self.nodes.iter()
    }

    fn target_nodes(&self, source: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.outgoing
            .get(source)
            .into_iter()
            .flat_map(|targets| targets.iter().map(|(target, count)| (target, *count)))
    }

    fn edge_count(&self, source: &V, target: &V) -> usize {
        self.outgoing
            .get(source)
            .and_then(|targets| targets.get(target))
            .copied()
            .unwrap_or(0)
    }
}

impl<V: GraphNode> BiDirectionalGraphDataSource<V> for Adjacency<V> {
    fn source_nodes(&self, target: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.incoming
            .get(target)
            .into_iter()
            .flat_map(|sources| sources.iter().map(|(source, count)| (source, *count)))
    }
}

/// Observable directed multigraph.
#[derive(Derivative)]
#[derivative(Default(bound = ""))]
pub struct Graph<V: GraphNode> {
    adjacency: Adjacency<V>,
    observers: Observers<dyn GraphObserver<V>>,
}

impl<V: GraphNode> Graph<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_observer(&mut self, observer: Rc<RefCell<dyn GraphObserver<V>>>) -> ObserverHandle {
        self.observers.attach(observer)
    }

    pub fn detach_observer(&mut self, handle: ObserverHandle) -> bool {
        self.observers.detach(handle)
    }

    pub fn adjacency(&self) -> &Adjacency<V> {
        &self.adjacency
    }

    pub fn contains_node(&self, node: &V) -> bool {
        self.adjacency.contains_node(node)
    }

    /// Inserts the node unless it is already present.
    pub fn insert_node(&mut self, node: V) -> bool {
        let inserted = self.adjacency.insert_node(node.clone());
        if inserted {
            self.observers.notify(|observer| observer.node_inserted(&node));
        }
        inserted
    }

    /// Inserts one more parallel edge, inserting missing endpoints first.
    pub fn insert_edge(&mut self, source: V, target: V) {
        self.insert_node(source.clone());
        self.insert_node(target.clone());
        self.adjacency.insert_edge(&source, &target);
        self.observers
            .notify(|observer| observer.edge_inserted(&source, &target));
    }

    /// No-op if there is no such edge.
    pub fn delete_edge_if_exists(&mut self, source: &V, target: &V) -> bool {
        if self.adjacency.edge_count(source, target) == 0 {
            return false;
        }
        self.delete_edge_that_exists(source, target);
        true
    }

    pub fn delete_edge_that_exists(&mut self, source: &V, target: &V) {
        if self.adjacency.delete_edge(source, target).is_none() {
            panic!("deleting edge ({source:?}, {target:?}) that does not exist");
        }
        self.observers
            .notify(|observer| observer.edge_deleted(source, target));
    }

    /// Deletes the node together with all of its incoming and outgoing edges.
    pub fn delete_node(&mut self, node: &V) {
        assert!(
            self.adjacency.contains_node(node),
            "deleting node {node:?} that is not in the graph"
        );
        let incoming: Vec<(V, usize)> = self
            .adjacency
            .source_nodes(node)
            .map(|(source, count)| (source.clone(), count))
            .collect();
        for (source, count) in incoming {
            for _ in 0..count {
                self.delete_edge_that_exists(&source, node);
            }
        }
        let outgoing: Vec<(V, usize)> = self
            .adjacency
            .target_nodes(node)
            .map(|(target, count)| (target.clone(), count))
            .collect();
        for (target, count) in outgoing {
            for _ in 0..count {
                self.delete_edge_that_exists(node, &target);
            }
        }
        self.adjacency.remove_node(node);
        self.observers.notify(|observer| observer.node_deleted(node));
    }
}

impl<V: GraphNode> GraphDataSource<V> for Graph<V> {
    fn all_nodes(&self) -> impl Iterator<Item = &V> + '_ {
        self.adjacency.all_nodes()
    }

    fn target_nodes(&self, source: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.adjacency.target_nodes(source)
    }

    fn edge_count(&self, source: &V, target: &V) -> usize {
        self.adjacency.edge_count(source, target)
    }
}

impl<V: GraphNode> BiDirectionalGraphDataSource<V> for Graph<V> {
    fn source_nodes(&self, target: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.adjacency.source_nodes(target)
    }
}

/// Bidirectional mirror of a data source that may only expose forward adjacency.
///
/// Built from a snapshot of the forward edges and kept current as an observer.
#[derive(Derivative)]
#[derivative(Default(bound = ""), Debug(bound = ""))]
pub struct BiDirectionalWrapper<V: GraphNode> {
    adjacency: Adjacency<V>,
}

impl<V: GraphNode> BiDirectionalWrapper<V> {
    pub fn new(source: &impl GraphDataSource<V>) -> Self {
        let mut adjacency = Adjacency::default();
        for node in source.all_nodes() {
            adjacency.insert_node(node.clone());
        }
        for node in source.all_nodes() {
            for (target, count) in source.target_nodes(node) {
                adjacency.insert_edge_with_multiplicity(node, target, count);
            }
        }
        Self { adjacency }
    }

    pub fn adjacency(&self) -> &Adjacency<V> {
        &self.adjacency
    }
}

impl<V: GraphNode> GraphObserver<V> for BiDirectionalWrapper<V> {
    fn edge_inserted(&mut self, source: &V, target: &V) {
        self.adjacency.insert_edge(source, target);
    }

    fn edge_deleted(&mut self, source: &V, target: &V) {
        if self.adjacency.delete_edge(source, target).is_none() {
            panic!("deleting edge ({source:?}, {target:?}) that does not exist");
        }
    }

    fn node_inserted(&mut self, node: &V) {
        self.adjacency.insert_node(node.clone());
    }

    fn node_deleted(&mut self, node: &V) {
        assert!(
            self.adjacency.remove_node(node),
            "deleting node {node:?} that is not in the graph"
        );
    }
}

impl<V: GraphNode> GraphDataSource<V> for BiDirectionalWrapper<V> {
    fn all_nodes(&self) -> impl Iterator<Item = &V> + '_ {
        self.adjacency.all_nodes()
    }

    fn target_nodes(&self, source: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.adjacency.target_nodes(source)
    }

    fn edge_count(&self, source: &V, target: &V) -> usize {
        self.adjacency.edge_count(source, target)
    }
}

impl<V: GraphNode> BiDirectionalGraphDataSource<V> for BiDirectionalWrapper<V> {
    fn source_nodes(&self, target: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.adjacency.source_nodes(target)
    }
}
