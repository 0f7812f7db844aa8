// Copyright © 2024 Pathway

use std::collections::HashMap;

use id_arena::Arena;
use indexmap::{IndexMap, IndexSet};

use super::GraphNode;

define_handle!(PartitionId);

/// One strongly connected component.
#[derive(Debug, Clone)]
pub struct Partition<V: GraphNode> {
    representative: V,
    members: IndexSet<V>,
}

impl<V: GraphNode> Partition<V> {
    pub fn representative(&self) -> &V {
        &self.representative
    }

    pub fn members(&self) -> &IndexSet<V> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// Union-find over graph nodes that also supports splitting a set apart.
///
/// Every merge or split retires the affected records and allocates fresh ones, so a
/// [`PartitionId`] never changes meaning while it is live.
pub(crate) struct PartitionTable<V: GraphNode> {
    arena: Arena<Partition<V>, PartitionId>,
    live: IndexSet<PartitionId>,
    membership: HashMap<V, PartitionId>,
}

impl<V: GraphNode> Default for PartitionTable<V> {
    fn default() -> Self {
        Self {
            arena: Arena::new(),
            live: IndexSet::new(),
            membership: HashMap::new(),
        }
    }
}

impl<V: GraphNode> PartitionTable<V> {
    pub fn contains(&self, node: &V) -> bool {
        self.membership.contains_key(node)
    }

    pub fn find(&self, node: &V) -> PartitionId {
        match self.membership.get(node) {
            Some(id) => *id,
            None => panic!("node {node:?} is not part of the observed graph"),
        }
    }

    pub fn get(&self, id: PartitionId) -> &Partition<V> {
        debug_assert!(self.live.contains(&id), "partition {id:?} has been retired");
        &self.arena[id]
    }

    pub fn members(&self, id: PartitionId) -> &IndexSet<V> {
        &self.get(id).members
    }

    pub fn live(&self) -> impl Iterator<Item = PartitionId> + '_ {
        self.live.iter().copied()
    }

    /// Creates a new set out of nodes that currently belong to no live set.
    pub fn make_set(&mut self, members: impl IntoIterator<Item = V>) -> PartitionId {
        let members: IndexSet<V> = members.into_iter().collect();
        let representative = match members.first() {
            Some(first) => first.clone(),
            None => panic!("cannot create an empty partition"),
        };
        let id = self.arena.alloc(Partition {
            representative,
            members,
        });
        for member in &self.arena[id].members {
            self.membership.insert(member.clone(), id);
        }
        self.live.insert(id);
        id
    }

    /// Retires the set without touching the membership of its nodes.
    fn retire(&mut self, id: PartitionId) -> Partition<V> {
        assert!(self.live.shift_remove(&id), "partition {id:?} retired twice");
        let partition = &mut self.arena[id];
        Partition {
            representative: partition.representative.clone(),
            members: std::mem::take(&mut partition.members),
        }
    }

    /// Removes the set and forgets all of its nodes.
    pub fn delete_set(&mut self, id: PartitionId) -> Partition<V> {
        let partition = self.retire(id);
        for member in &partition.members {
            self.membership.remove(member);
        }
        partition
    }

    /// Merges the given sets into a fresh one. The representative of the largest set is kept.
    pub fn union(&mut self, ids: impl IntoIterator<Item = PartitionId>) -> PartitionId {
        let mut retired: Vec<Partition<V>> = ids.into_iter().map(|id| self.retire(id)).collect();
        let largest = retired
            .iter()
            .enumerate()
            .max_by_key(|(index, partition)| (partition.len(), std::cmp::Reverse(*index)))
            .map_or(0, |(index, _)| index);
        retired.swap(0, largest);
        let members: IndexSet<V> = retired
            .into_iter()
            .flat_map(|partition| partition.members)
            .collect();
        self.make_set(members)
    }

    /// Replaces a set with the given components, which must cover it exactly.
    pub fn split(&mut self, id: PartitionId, components: Vec<Vec<V>>) -> Vec<PartitionId> {
        let old = self.retire(id);
        debug_assert_eq!(
            components.iter().map(Vec::len).sum::<usize>(),
            old.members.len()
        );
        let mut by_first_member: IndexMap<usize, Vec<V>> = components
            .into_iter()
            .map(|mut component| {
                component.sort_by_key(|member| {
                    old.members.get_index_of(member).unwrap_or(usize::MAX)
                });
                let position = component
                    .first()
                    .and_then(|member| old.members.get_index_of(member))
                    .unwrap_or(usize::MAX);
                (position, component)
            })
            .collect();
        by_first_member.sort_keys();
        by_first_member
            .into_values()
            .map(|component| self.make_set(component))
            .collect()
    }
}
