// Copyright © 2024 Pathway

use std::cell::{Ref, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::{debug, error, trace};

use super::{CommunicationGroup, GroupId, MailboxId, MessageSelector, NodeTraits, Proxy};
use crate::engine::itc::scc::topological_sort;
use crate::engine::itc::{Graph, GraphDataSource, IncSccAlg};
use crate::engine::{NodeId, Timestamp, TimestampTransformation, TimelyConfiguration};

/// Keeps the communication groups of a network and schedules their mailboxes.
///
/// Dependencies between nodes are registered as they appear. Groups follow the strongly
/// connected components of the dependency graph and carry identifiers that respect the
/// topological order of the components. Active groups are delivered in the order of their
/// identifiers.
pub struct CommunicationTracker {
    configuration: TimelyConfiguration,
    dependency_graph: Graph<NodeId>,
    detector: Rc<RefCell<IncSccAlg<NodeId>>>,
    traits: HashMap<NodeId, NodeTraits>,
    groups: IndexMap<GroupId, CommunicationGroup>,
    group_map: HashMap<NodeId, GroupId>,
    group_queue: BTreeSet<(i64, GroupId)>,
    delivering: Option<GroupId>,
    next_group_id: usize,
    min_group_identifier: i64,
    max_group_identifier: i64,
}

impl CommunicationTracker {
    pub fn new(configuration: TimelyConfiguration) -> Self {
        let mut dependency_graph = Graph::new();
        let detector = IncSccAlg::attach_to(&mut dependency_graph);
        Self {
            configuration,
            dependency_graph,
            detector,
            traits: HashMap::new(),
            groups: IndexMap::new(),
            group_map: HashMap::new(),
            group_queue: BTreeSet::new(),
            delivering: None,
            next_group_id: 0,
            min_group_identifier: 0,
            max_group_identifier: 0,
        }
    }

    pub fn configuration(&self) -> &TimelyConfiguration {
        &self.configuration
    }

    pub fn dependency_graph(&self) -> &Graph<NodeId> {
        &self.dependency_graph
    }

    /// Component information about the dependency graph.
    pub fn components(&self) -> Ref<'_, IncSccAlg<NodeId>> {
        self.detector.borrow()
    }

    pub fn register_node(&mut self, node: NodeId, traits: NodeTraits) {
        self.traits.insert(node, traits);
        self.dependency_graph.insert_node(node);
    }

    pub fn traits(&self, node: NodeId) -> NodeTraits {
        self.traits.get(&node).copied().unwrap_or_default()
    }

    pub fn group(&self, id: GroupId) -> Option<&CommunicationGroup> {
        self.groups.get(&id)
    }

    pub fn group_of(&self, node: NodeId) -> Option<&CommunicationGroup> {
        self.group_map
            .get(&node)
            .and_then(|id| self.groups.get(id))
    }

    pub fn groups(&self) -> impl Iterator<Item = &CommunicationGroup> + '_ {
        self.groups.values()
    }

    fn representative(&self, node: NodeId) -> NodeId {
        *self.detector.borrow().representative(&node)
    }

    fn create_group(&mut self, representative: NodeId, identifier: i64) -> GroupId {
        let id = GroupId(self.next_group_id);
        self.next_group_id += 1;
        let recursive = self.detector.borrow().is_in_cycle(&representative);
        self.groups.insert(
            id,
            CommunicationGroup::new(id, representative, identifier, recursive),
        );
        self.group_map.insert(representative, id);
        id
    }

    fn ensure_group(&mut self, node: NodeId) -> GroupId {
        if let Some(id) = self.group_map.get(&node) {
            return *id;
        }
        self.dependency_graph.insert_node(node);
        let representative = self.representative(node);
        if let Some(id) = self.group_map.get(&representative).copied() {
            self.group_map.insert(node, id);
            return id;
        }
        self.max_group_identifier += 1;
        self.create_group(representative, self.max_group_identifier)
    }

    /// Registers that `source` may send messages to `target`. Registering an existing
    /// dependency is a no-op.
    pub fn register_dependency(&mut self, source: NodeId, target: NodeId) {
        self.dependency_graph.insert_node(source);
        self.dependency_graph.insert_node(target);
        if self.dependency_graph.adjacency().edge_count(&source, &target) > 0 {
            return;
        }

        let (source_representative, target_representative, target_had_outgoing_edges) = {
            let detector = self.detector.borrow();
            let source_representative = *detector.representative(&source);
            let target_representative = *detector.representative(&target);
            let target_had_outgoing_edges = detector.has_outgoing_edges(&target_representative);
            (
                source_representative,
                target_representative,
                target_had_outgoing_edges,
            )
        };

        self.dependency_graph.insert_edge(source, target);

        let source_group = match self.group_map.get(&source_representative) {
            Some(id) => *id,
            None => {
                self.min_group_identifier -= 1;
                self.create_group(source_representative, self.min_group_identifier)
            }
        };
        let target_group = match self.group_map.get(&target_representative) {
            Some(id) => *id,
            None => {
                self.max_group_identifier += 1;
                self.create_group(target_representative, self.max_group_identifier)
            }
        };
        let source_index = self.groups[&source_group].identifier;
        let target_index = self.groups[&target_group].identifier;

        if source_index <= target_index {
            self.refresh_recursive_flag(source_group);
            self.post_process_group(source_group);
            if source_group != target_group {
                self.post_process_group(target_group);
            }
        } else if !target_had_outgoing_edges {
            let was_enqueued = self.group_queue.remove(&(target_index, target_group));
            self.max_group_identifier += 1;
            self.groups[&target_group].identifier = self.max_group_identifier;
            if was_enqueued {
                self.group_queue
                    .insert((self.max_group_identifier, target_group));
            }
            trace!(
                "moved group {target_group} from {target_index} to {}",
                self.max_group_identifier
            );
            self.post_process_group(source_group);
            self.post_process_group(target_group);
        } else {
            self.precompute_groups();
        }
    }

    /// Removes the dependency from `source` to `target`, if registered.
    pub fn unregister_dependency(&mut self, source: NodeId, target: NodeId) {
        if !self.dependency_graph.delete_edge_if_exists(&source, &target) {
            return;
        }
        let source_representative = self.representative(source);
        let target_representative = self.representative(target);
        if source_representative == target_representative {
            if let Some(id) = self.group_map.get(&source_representative).copied() {
                self.refresh_recursive_flag(id);
                self.post_process_group(id);
            }
        } else {
            self.precompute_groups();
        }
    }

    fn refresh_recursive_flag(&mut self, id: GroupId) {
        let representative = self.groups[&id].representative();
        let recursive = self.detector.borrow().is_in_cycle(&representative);
        self.groups[&id].recursive = recursive;
    }

    /// Rebuilds all groups from the components of the dependency graph. Pending mailboxes of
    /// the old groups are moved into the new ones.
    fn precompute_groups(&mut self) {
        let old_groups = std::mem::take(&mut self.groups);
        self.group_map.clear();
        self.group_queue.clear();
        self.delivering = None;

        let representatives = self.detector.borrow().topological_representatives();
        for (index, representative) in representatives.iter().enumerate() {
            let identifier = i64::try_from(index).unwrap_or(i64::MAX);
            self.create_group(*representative, identifier);
        }
        self.min_group_identifier = 0;
        self.max_group_identifier = i64::try_from(representatives.len())
            .unwrap_or(i64::MAX)
            .saturating_sub(1);

        let nodes: Vec<NodeId> = self.dependency_graph.adjacency().all_nodes().copied().collect();
        for node in nodes {
            let representative = self.representative(node);
            if representative != node {
                let id = self.group_map[&representative];
                self.group_map.insert(node, id);
            }
        }

        self.reconstruct_queue_contents(old_groups.values());

        let ids: Vec<GroupId> = self.groups.keys().copied().collect();
        for id in ids {
            self.post_process_group(id);
        }
        debug!(
            "recomputed {} communication groups over {} nodes",
            self.groups.len(),
            self.group_map.len()
        );
    }

    fn reconstruct_queue_contents<'a>(
        &mut self,
        old_groups: impl IntoIterator<Item = &'a CommunicationGroup>,
    ) {
        for old_group in old_groups {
            for (timestamp, mailbox) in old_group.mailboxes() {
                self.notify_has_message(mailbox, timestamp.into());
            }
        }
    }

    /// Ranks the members of a recursive group so that mailboxes with the same timestamp are
    /// delivered in the topological order of the group without its cut points.
    fn post_process_group(&mut self, id: GroupId) {
        if !self.configuration.is_faithful() {
            return;
        }
        let representative = self.groups[&id].representative();
        let members: IndexSet<NodeId> = self.detector.borrow().partition(&representative).clone();
        if members.len() <= 1 {
            return;
        }
        let adjacency = self.dependency_graph.adjacency();
        let ordered = topological_sort(members.iter().copied(), |source: &NodeId| {
            adjacency
                .target_nodes(source)
                .map(|(target, _)| *target)
                .filter(|target| {
                    members.contains(target) && !self.traits(*target).production
                })
                .collect::<Vec<_>>()
        });
        let ranks: HashMap<NodeId, usize> = ordered
            .into_iter()
            .enumerate()
            .map(|(rank, node)| (node, rank))
            .collect();
        self.groups[&id].set_ranks_and_reorder(ranks);
    }

    pub fn is_in_recursive_group(&self, node: NodeId) -> bool {
        self.group_of(node)
            .is_some_and(CommunicationGroup::is_recursive)
    }

    pub fn are_in_same_group(&self, left: NodeId, right: NodeId) -> bool {
        match (self.group_map.get(&left), self.group_map.get(&right)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    /// Whether the edge from `source` to `target` is an edge into a production node inside one
    /// group.
    pub fn is_recursion_cut_point(&self, source: NodeId, target: NodeId) -> bool {
        self.are_in_same_group(source, target) && self.traits(target).production
    }

    /// Transformation applied to timestamps of messages sent from `source` to `target`.
    pub fn preprocessor(&self, source: NodeId, target: NodeId) -> Option<TimestampTransformation> {
        let source_group = self.group_map.get(&source)?;
        let target_group = self.group_map.get(&target)?;
        if source_group != target_group && self.groups[source_group].is_recursive() {
            Some(TimestampTransformation::Reset)
        } else if source_group == target_group && self.traits(target).production {
            Some(TimestampTransformation::Increment)
        } else {
            None
        }
    }

    /// The way messages of `source` reach `mailbox` under the current group structure.
    pub fn proxify(&self, source: NodeId, mailbox: MailboxId) -> Proxy {
        Proxy::new(mailbox, self.preprocessor(source, mailbox.node))
    }

    /// Recomputes `proxy` for `source`, dropping the transformation of the old one.
    pub fn reproxify(&self, source: NodeId, proxy: &Proxy) -> Proxy {
        self.proxify(source, proxy.mailbox())
    }

    fn activate(&mut self, id: GroupId) {
        let group = &mut self.groups[&id];
        group.is_enqueued = true;
        self.group_queue.insert((group.identifier, id));
    }

    fn deactivate(&mut self, id: GroupId) {
        let group = &mut self.groups[&id];
        group.is_enqueued = false;
        self.group_queue.remove(&(group.identifier, id));
    }

    /// Registers that `mailbox` has messages for `selector`.
    ///
    /// # Panics
    ///
    /// Panics if `selector` is not a timestamp.
    pub fn notify_has_message(&mut self, mailbox: MailboxId, selector: MessageSelector) {
        let MessageSelector::Timestamp(timestamp) = selector else {
            panic!("unsupported message selector {selector}");
        };
        let id = self.ensure_group(mailbox.node);
        let monitor = self.configuration.monitors_timestamp_violations();
        let group = &mut self.groups[&id];
        if monitor {
            if let Some(delivered) = group.currently_delivered() {
                if timestamp < delivered {
                    error!(
                        "[INTERNAL ERROR] Violation of differential dataflow communication schema! \
                         The communication group with representative {:?} observed decreasing \
                         timestamp {timestamp} while delivering {delivered}!",
                        group.representative()
                    );
                }
            }
        }
        group.enqueue(mailbox, timestamp);
        if !group.is_enqueued && !group.currently_delivering {
            self.activate(id);
        }
    }

    /// Registers that `mailbox` no longer has messages for `selector`.
    ///
    /// # Panics
    ///
    /// Panics if `selector` is not a timestamp or the mailbox was not registered for it.
    pub fn notify_lost_all_messages(&mut self, mailbox: MailboxId, selector: MessageSelector) {
        let MessageSelector::Timestamp(timestamp) = selector else {
            panic!("unsupported message selector {selector}");
        };
        let Some(id) = self.group_map.get(&mailbox.node).copied() else {
            panic!("mailbox {mailbox:?} belongs to no communication group");
        };
        let group = &mut self.groups[&id];
        group.dequeue(mailbox, timestamp);
        if group.is_empty() {
            self.deactivate(id);
        }
    }

    /// Removes the active group with the smallest identifier.
    pub fn pop_first_group(&mut self) -> Option<GroupId> {
        let (_identifier, id) = self.group_queue.pop_first()?;
        if let Some(group) = self.groups.get_mut(&id) {
            group.is_enqueued = false;
        }
        Some(id)
    }

    /// Next mailbox to deliver together with the timestamp of the messages to take from it.
    ///
    /// The group being delivered is drained before the next active group is started. A group
    /// being delivered is not enqueued again when its mailboxes receive messages.
    pub fn next_delivery(&mut self) -> Option<(MailboxId, Timestamp)> {
        loop {
            if let Some(id) = self.delivering {
                if let Some(group) = self.groups.get_mut(&id) {
                    if let Some(next) = group.pop_next() {
                        return Some(next);
                    }
                    group.finish_delivery();
                }
                self.delivering = None;
            }
            let id = self.pop_first_group()?;
            if let Some(group) = self.groups.get_mut(&id) {
                group.currently_delivering = true;
                self.delivering = Some(id);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.group_queue.is_empty()
            && self
                .delivering
                .and_then(|id| self.groups.get(&id))
                .is_none_or(CommunicationGroup::is_empty)
    }

    /// Forgets all pending mailboxes.
    pub fn clear(&mut self) {
        for group in self.groups.values_mut() {
            group.clear();
            group.is_enqueued = false;
        }
        self.group_queue.clear();
        self.delivering = None;
    }
}
