// Copyright © 2024 Pathway

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use super::counting::{CountingAlg, TcChange};
use super::graph::{Adjacency, BiDirectionalWrapper, Graph};
use super::partition::{Partition, PartitionId, PartitionTable};
use super::scc::{shortest_path, strongly_connected_components, topological_sort};
use super::{
    BiDirectionalGraphDataSource, GraphDataSource, GraphNode, GraphObserver, ObserverHandle,
    Observers, TcObserver,
};
use crate::engine::Direction;

/// Incremental maintenance of strongly connected components and of the transitive closure.
///
/// Nodes that are mutually reachable share a [`Partition`]. Partitions form the reduced graph,
/// which is acyclic and whose reachability is kept by a [`CountingAlg`]. A node reaches itself
/// only if its partition has more than one member or the node has a self-loop.
pub struct IncSccAlg<V: GraphNode> {
    data: BiDirectionalWrapper<V>,
    partitions: PartitionTable<V>,
    reduced: Adjacency<PartitionId>,
    counting: CountingAlg<PartitionId>,
    observers: Observers<dyn TcObserver<V>>,
}

type Notification<V> = (V, V, Direction);

impl<V: GraphNode> IncSccAlg<V> {
    /// Creates the algorithm for `graph` and registers it as an observer.
    pub fn attach_to(graph: &mut Graph<V>) -> Rc<RefCell<Self>> {
        let alg = Rc::new(RefCell::new(Self::new(graph)));
        graph.attach_observer(alg.clone());
        alg
    }

    /// Computes components of the current snapshot of `source`. The caller is responsible for
    /// forwarding later changes of `source`, see [`IncSccAlg::attach_to`].
    pub fn new(source: &impl GraphDataSource<V>) -> Self {
        let data = BiDirectionalWrapper::new(source);
        let mut partitions = PartitionTable::default();
        let components = strongly_connected_components(data.all_nodes().cloned(), |node: &V| {
            data.target_nodes(node)
                .map(|(target, _)| target.clone())
                .collect::<Vec<_>>()
        });
        let mut reduced = Adjacency::default();
        for component in components.into_iter().rev() {
            reduced.insert_node(partitions.make_set(component));
        }
        for (source, target, count) in data.adjacency().edges() {
            let source_id = partitions.find(source);
            let target_id = partitions.find(target);
            if source_id != target_id {
                reduced.insert_edge_with_multiplicity(&source_id, &target_id, count);
            }
        }
        let counting = CountingAlg::new(&reduced);
        debug!(
            "initialized incremental SCC over {} nodes with {} partitions",
            data.adjacency().node_count(),
            reduced.node_count()
        );
        Self {
            data,
            partitions,
            reduced,
            counting,
            observers: Observers::default(),
        }
    }

    pub fn attach_observer(&mut self, observer: Rc<RefCell<dyn TcObserver<V>>>) -> ObserverHandle {
        self.observers.attach(observer)
    }

    pub fn detach_observer(&mut self, handle: ObserverHandle) -> bool {
        self.observers.detach(handle)
    }

    pub fn contains_node(&self, node: &V) -> bool {
        self.partitions.contains(node)
    }

    /// The node standing for the partition of `node`.
    pub fn representative(&self, node: &V) -> &V {
        self.partitions.get(self.partitions.find(node)).representative()
    }

    pub fn partition_of(&self, node: &V) -> &Partition<V> {
        self.partitions.get(self.partitions.find(node))
    }

    /// Members of the partition of `node`, usually called with a representative.
    pub fn partition(&self, node: &V) -> &IndexSet<V> {
        self.partition_of(node).members()
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition<V>> + '_ {
        self.partitions.live().map(|id| self.partitions.get(id))
    }

    pub fn self_loop_count(&self, node: &V) -> usize {
        self.data.adjacency().self_loop_count(node)
    }

    /// Whether the node lies on a cycle: its partition is larger than one, or it has a self-loop.
    pub fn is_in_cycle(&self, node: &V) -> bool {
        self.reaches_itself(self.partitions.find(node))
    }

    fn reaches_itself(&self, id: PartitionId) -> bool {
        let partition = self.partitions.get(id);
        partition.len() > 1 || self.self_loop_count(partition.representative()) > 0
    }

    /// Whether a path of at least one edge leads from `source` to `target`.
    pub fn is_reachable(&self, source: &V, target: &V) -> bool {
        let source_id = self.partitions.find(source);
        let target_id = self.partitions.find(target);
        if source_id == target_id {
            source != target || self.reaches_itself(source_id)
        } else {
            self.counting.is_reachable(&source_id, &target_id)
        }
    }

    pub fn reachable_targets(&self, source: &V) -> IndexSet<V> {
        let source_id = self.partitions.find(source);
        let own = self.reaches_itself(source_id).then_some(source_id);
        own.into_iter()
            .chain(self.counting.reachable_targets(&source_id).copied())
            .flat_map(|id| self.partitions.members(id).iter().cloned())
            .collect()
    }

    pub fn reachable_sources(&self, target: &V) -> IndexSet<V> {
        let target_id = self.partitions.find(target);
        let own = self.reaches_itself(target_id).then_some(target_id);
        own.into_iter()
            .chain(self.counting.reachable_sources(&target_id).copied())
            .flat_map(|id| self.partitions.members(id).iter().cloned())
            .collect()
    }

    /// Every pair of the transitive closure.
    pub fn tc_relation(&self) -> Vec<(V, V)> {
        let mut relation = Vec::new();
        for source_id in self.partitions.live() {
            let sources = self.partitions.members(source_id);
            let own = self.reaches_itself(source_id).then_some(source_id);
            for target_id in own
                .into_iter()
                .chain(self.counting.reachable_targets(&source_id).copied())
            {
                let targets = self.partitions.members(target_id);
                for source in sources {
                    for target in targets {
                        relation.push((source.clone(), target.clone()));
                    }
                }
            }
        }
        relation
    }

    /// A shortest path from `source` to `target`, both included, or `None` if unreachable.
    pub fn reachability_path(&self, source: &V, target: &V) -> Option<Vec<V>> {
        if !self.is_reachable(source, target) {
            return None;
        }
        let source_id = self.partitions.find(source);
        let target_id = self.partitions.find(target);
        let towards_target: HashSet<PartitionId> =
            self.counting.reachable_sources(&target_id).copied().collect();
        let mut allowed: HashSet<PartitionId> = self
            .counting
            .reachable_targets(&source_id)
            .filter(|id| towards_target.contains(*id))
            .copied()
            .collect();
        allowed.insert(source_id);
        allowed.insert(target_id);
        shortest_path(source, target, |node: &V| {
            self.data
                .target_nodes(node)
                .filter(|(next, _)| allowed.contains(&self.partitions.find(next)))
                .map(|(next, _)| next.clone())
                .collect::<Vec<_>>()
        })
    }

    /// Whether the partition represented by `representative` has edges from other partitions.
    pub fn has_incoming_edges(&self, representative: &V) -> bool {
        let id = self.partitions.find(representative);
        self.reduced.source_nodes(&id).next().is_some()
    }

    /// Whether the partition represented by `representative` has edges into other partitions.
    pub fn has_outgoing_edges(&self, representative: &V) -> bool {
        let id = self.partitions.find(representative);
        self.reduced.target_nodes(&id).next().is_some()
    }

    /// Representatives ordered so that edges of the reduced graph point forward.
    pub fn topological_representatives(&self) -> Vec<V> {
        topological_sort(self.partitions.live(), |id: &PartitionId| {
            self.reduced
                .target_nodes(id)
                .map(|(target, _)| *target)
                .collect::<Vec<_>>()
        })
        .into_iter()
        .map(|id| self.partitions.get(id).representative().clone())
        .collect()
    }

    /// Representatives of the partitions directly reachable from the given one.
    pub fn reduced_targets(&self, representative: &V) -> Vec<V> {
        let id = self.partitions.find(representative);
        self.reduced
            .target_nodes(&id)
            .map(|(target, _)| self.partitions.get(*target).representative().clone())
            .collect()
    }

    fn ensure_node(&mut self, node: &V) {
        if !self.partitions.contains(node) {
            self.data.node_inserted(node);
            let id = self.partitions.make_set([node.clone()]);
            self.reduced.insert_node(id);
        }
    }

    fn expand(
        &self,
        changes: Vec<TcChange<PartitionId>>,
        notifications: &mut Vec<Notification<V>>,
    ) {
        for change in changes {
            self.notify_product(change.source, change.target, change.direction, notifications);
        }
    }

    fn notify_product(
        &self,
        source_id: PartitionId,
        target_id: PartitionId,
        direction: Direction,
        notifications: &mut Vec<Notification<V>>,
    ) {
        for source in self.partitions.members(source_id) {
            for target in self.partitions.members(target_id) {
                notifications.push((source.clone(), target.clone(), direction));
            }
        }
    }

    /// Notifies every pair between `sources` and `targets` whose reachability is not implied by
    /// the current state.
    fn notify_unimplied(
        &self,
        sources: &IndexSet<PartitionId>,
        targets: &IndexSet<PartitionId>,
        direction: Direction,
        notifications: &mut Vec<Notification<V>>,
    ) {
        for source_id in sources {
            for target_id in targets {
                if self.counting.is_reachable(source_id, target_id) {
                    continue;
                }
                if source_id == target_id && self.reaches_itself(*source_id) {
                    continue;
                }
                self.notify_product(*source_id, *target_id, direction, notifications);
            }
        }
    }

    fn flush(&self, notifications: Vec<Notification<V>>) {
        if notifications.is_empty() {
            return;
        }
        self.observers.notify(|observer| {
            for (source, target, direction) in &notifications {
                match direction {
                    Direction::Insert => observer.tuple_inserted(source, target),
                    Direction::Delete => observer.tuple_deleted(source, target),
                }
            }
        });
    }

    fn insert_reduced_edge(
        &mut self,
        source: PartitionId,
        target: PartitionId,
        multiplicity: usize,
    ) -> Vec<TcChange<PartitionId>> {
        let mut changes = Vec::new();
        if self
            .reduced
            .insert_edge_with_multiplicity(&source, &target, multiplicity)
            == multiplicity
        {
            self.counting
                .edge_inserted(&self.reduced, &source, &target, &mut changes);
        }
        changes
    }

    /// Detaches the partition from the reduced graph.
    fn isolate(&mut self, id: PartitionId) {
        let incident: IndexSet<(PartitionId, PartitionId)> = self
            .reduced
            .source_nodes(&id)
            .map(|(source, _)| (*source, id))
            .chain(self.reduced.target_nodes(&id).map(|(target, _)| (id, *target)))
            .collect();
        let mut ignored = Vec::new();
        for (source, target) in incident {
            self.reduced.delete_all_edges(&source, &target);
            self.counting
                .edge_deleted(&self.reduced, &source, &target, &mut ignored);
        }
        self.reduced.remove_node(&id);
        self.counting.node_deleted(&id);
    }

    /// Reattaches freshly created partitions to the reduced graph, based on the data edges of
    /// their members.
    fn connect(&mut self, fresh: &[PartitionId]) {
        let mut edges: IndexMap<(PartitionId, PartitionId), usize> = IndexMap::new();
        for &id in fresh {
            for member in self.partitions.members(id) {
                for (target, count) in self.data.target_nodes(member) {
                    let target_id = self.partitions.find(target);
                    if target_id != id {
                        *edges.entry((id, target_id)).or_default() += count;
                    }
                }
                for (source, count) in self.data.source_nodes(member) {
                    let source_id = self.partitions.find(source);
                    if source_id != id && !fresh.contains(&source_id) {
                        *edges.entry((source_id, id)).or_default() += count;
                    }
                }
            }
        }
        for ((source, target), count) in edges {
            self.insert_reduced_edge(source, target, count);
        }
    }

    fn merge_cycle(
        &mut self,
        source_id: PartitionId,
        target_id: PartitionId,
        notifications: &mut Vec<Notification<V>>,
    ) {
        let mut sources: IndexSet<PartitionId> =
            self.counting.reachable_sources(&source_id).copied().collect();
        sources.insert(source_id);
        let mut targets: IndexSet<PartitionId> =
            self.counting.reachable_targets(&target_id).copied().collect();
        targets.insert(target_id);

        // must reflect the state before the union
        if !self.observers.is_empty() {
            self.notify_unimplied(&sources, &targets, Direction::Insert, notifications);
        }

        let cycle: Vec<PartitionId> = sources
            .iter()
            .filter(|id| targets.contains(*id))
            .copied()
            .collect();
        for id in &cycle {
            self.isolate(*id);
        }
        let merged = self.partitions.union(cycle);
        self.reduced.insert_node(merged);
        self.connect(&[merged]);
        debug!(
            "merged partitions into {merged:?} with {} members",
            self.partitions.members(merged).len()
        );
    }

    fn split(
        &mut self,
        id: PartitionId,
        source: &V,
        target: &V,
        notifications: &mut Vec<Notification<V>>,
    ) {
        let members = self.partitions.members(id).clone();
        let components = strongly_connected_components(members.iter().cloned(), |node: &V| {
            self.data
                .target_nodes(node)
                .filter(|(next, _)| members.contains(*next))
                .map(|(next, _)| next.clone())
                .collect::<Vec<_>>()
        });
        self.isolate(id);
        let fresh = self.partitions.split(id, components);
        for fresh_id in &fresh {
            self.reduced.insert_node(*fresh_id);
        }
        self.connect(&fresh);
        debug!("split partition {id:?} into {} partitions", fresh.len());

        if !self.observers.is_empty() {
            let source_id = self.partitions.find(source);
            let target_id = self.partitions.find(target);
            let mut sources: IndexSet<PartitionId> =
                self.counting.reachable_sources(&source_id).copied().collect();
            sources.insert(source_id);
            let mut targets: IndexSet<PartitionId> =
                self.counting.reachable_targets(&target_id).copied().collect();
            targets.insert(target_id);
            self.notify_unimplied(&sources, &targets, Direction::Delete, notifications);
        }
    }
}

impl<V: GraphNode> GraphObserver<V> for IncSccAlg<V> {
    fn edge_inserted(&mut self, source: &V, target: &V) {
        self.ensure_node(source);
        self.ensure_node(target);
        self.data.edge_inserted(source, target);

        let source_id = self.partitions.find(source);
        let target_id = self.partitions.find(target);
        let mut notifications = Vec::new();

        if source_id == target_id {
            if !self.observers.is_empty()
                && self.partitions.get(source_id).is_singleton()
                && self.data.edge_count(source, target) == 1
            {
                notifications.push((source.clone(), source.clone(), Direction::Insert));
            }
        } else if self.counting.is_reachable(&target_id, &source_id) {
            self.merge_cycle(source_id, target_id, &mut notifications);
        } else {
            let changes = self.insert_reduced_edge(source_id, target_id, 1);
            if !self.observers.is_empty() {
                self.expand(changes, &mut notifications);
            }
        }

        self.flush(notifications);
    }

    fn edge_deleted(&mut self, source: &V, target: &V) {
        self.data.edge_deleted(source, target);

        let source_id = self.partitions.find(source);
        let target_id = self.partitions.find(target);
        let mut notifications = Vec::new();

        if source_id != target_id {
            match self.reduced.delete_edge(&source_id, &target_id) {
                Some(0) => {
                    let mut changes = Vec::new();
                    self.counting
                        .edge_deleted(&self.reduced, &source_id, &target_id, &mut changes);
                    if !self.observers.is_empty() {
                        self.expand(changes, &mut notifications);
                    }
                }
                Some(_) => {}
                None => panic!(
                    "reduced graph has no edge between the partitions of {source:?} and {target:?}"
                ),
            }
        } else {
            let members = self.partitions.members(source_id);
            let still_reachable = source == target
                || shortest_path(source, target, |node: &V| {
                    self.data
                        .target_nodes(node)
                        .filter(|(next, _)| members.contains(*next))
                        .map(|(next, _)| next.clone())
                        .collect::<Vec<_>>()
                })
                .is_some();
            if still_reachable {
                if !self.observers.is_empty()
                    && self.partitions.get(source_id).is_singleton()
                    && self.data.edge_count(source, target) == 0
                {
                    notifications.push((source.clone(), source.clone(), Direction::Delete));
                }
            } else {
                self.split(source_id, source, target, &mut notifications);
            }
        }

        self.flush(notifications);
    }

    fn node_inserted(&mut self, node: &V) {
        self.ensure_node(node);
    }

    fn node_deleted(&mut self, node: &V) {
        assert!(
            self.partitions.contains(node),
            "deleting node {node:?} twice"
        );
        let incoming: Vec<(V, usize)> = self
            .data
            .source_nodes(node)
            .map(|(source, count)| (source.clone(), count))
            .collect();
        for (source, count) in incoming {
            for _ in 0..count {
                self.edge_deleted(&source, node);
            }
        }
        let outgoing: Vec<(V, usize)> = self
            .data
            .target_nodes(node)
            .map(|(target, count)| (target.clone(), count))
            .collect();
        for (target, count) in outgoing {
            for _ in 0..count {
                self.edge_deleted(node, &target);
            }
        }
        let id = self.partitions.find(node);
        self.isolate(id);
        self.partitions.delete_set(id);
        self.data.node_deleted(node);
    }
}
