// Copyright © 2024 Pathway

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use super::TimelyMemory;
use crate::engine::{Diff, Direction, Timeline, Timestamp, Tuple, TupleMask, Value};

/// Key under which a masked memory groups its tuples.
pub trait MemoryKey: Clone + Eq + Hash + Debug {
    /// Whether keys of this type can represent projections through `mask`.
    fn accepts(mask: &TupleMask) -> bool;

    fn from_tuple(mask: &TupleMask, tuple: &Tuple) -> Self;

    fn from_signature(signature: &Tuple) -> Self;

    fn to_signature(&self) -> Tuple;
}

impl MemoryKey for () {
    fn accepts(mask: &TupleMask) -> bool {
        mask.is_empty()
    }

    fn from_tuple(_mask: &TupleMask, _tuple: &Tuple) -> Self {}

    fn from_signature(_signature: &Tuple) -> Self {}

    fn to_signature(&self) -> Tuple {
        Tuple::empty()
    }
}

impl MemoryKey for Value {
    fn accepts(mask: &TupleMask) -> bool {
        mask.len() == 1
    }

    fn from_tuple(mask: &TupleMask, tuple: &Tuple) -> Self {
        tuple[mask.indices()[0]].clone()
    }

    fn from_signature(signature: &Tuple) -> Self {
        signature[0].clone()
    }

    fn to_signature(&self) -> Tuple {
        Tuple::from([self.clone()])
    }
}

impl MemoryKey for Tuple {
    fn accepts(_mask: &TupleMask) -> bool {
        true
    }

    fn from_tuple(mask: &TupleMask, tuple: &Tuple) -> Self {
        mask.project(tuple)
    }

    fn from_signature(signature: &Tuple) -> Self {
        signature.clone()
    }

    fn to_signature(&self) -> Tuple {
        self.clone()
    }
}

/// Timely memories of tuples grouped by their projection through a mask.
#[derive(Debug, Clone)]
pub struct TimelyMaskedMemory<K: MemoryKey> {
    mask: TupleMask,
    lazy: bool,
    memories: IndexMap<K, TimelyMemory>,
    folding_states: BTreeMap<Timestamp, IndexSet<K>>,
}

pub type NullaryMaskedMemory = TimelyMaskedMemory<()>;
pub type UnaryMaskedMemory = TimelyMaskedMemory<Value>;
pub type DefaultMaskedMemory = TimelyMaskedMemory<Tuple>;

impl<K: MemoryKey> TimelyMaskedMemory<K> {
    pub fn new(mask: TupleMask, lazy: bool) -> Self {
        assert!(
            K::accepts(&mask),
            "mask {:?} cannot be used with this memory key",
            mask.indices()
        );
        Self {
            mask,
            lazy,
            memories: IndexMap::new(),
            folding_states: BTreeMap::new(),
        }
    }

    pub fn mask(&self) -> &TupleMask {
        &self.mask
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn add_with_timestamp(&mut self, tuple: &Tuple, timestamp: Timestamp) -> Diff {
        let key = K::from_tuple(&self.mask, tuple);
        let lazy = self.lazy;
        let memory = self
            .memories
            .entry(key.clone())
            .or_insert_with(|| TimelyMemory::new(lazy));
        let before = memory.resumable_timestamp();
        let diff = memory.put(tuple, timestamp);
        self.settle(key, before);
        diff
    }

    /// # Panics
    ///
    /// Panics on duplicate deletion.
    pub fn remove_with_timestamp(&mut self, tuple: &Tuple, timestamp: Timestamp) -> Diff {
        let key = K::from_tuple(&self.mask, tuple);
        let Some(memory) = self.memories.get_mut(&key) else {
            panic!("duplicate deletion of {tuple}: no tuple with signature {key:?}");
        };
        let before = memory.resumable_timestamp();
        let diff = memory.remove(tuple, timestamp);
        self.settle(key, before);
        diff
    }

    pub fn update_with_timestamp(
        &mut self,
        direction: Direction,
        tuple: &Tuple,
        timestamp: Timestamp,
    ) -> Diff {
        match direction {
            Direction::Insert => self.add_with_timestamp(tuple, timestamp),
            Direction::Delete => self.remove_with_timestamp(tuple, timestamp),
        }
    }

    /// Moves `key` to its new resumable timestamp and drops its memory once it is empty.
    fn settle(&mut self, key: K, before: Option<Timestamp>) {
        let Some(memory) = self.memories.get(&key) else {
            return;
        };
        let after = memory.resumable_timestamp();
        let empty = memory.is_empty();
        if before != after {
            if let Some(before) = before {
                self.unregister_folding(&key, before);
            }
            if let Some(after) = after {
                self.folding_states.entry(after).or_default().insert(key.clone());
            }
        }
        if empty {
            self.memories.shift_remove(&key);
        }
    }

    fn unregister_folding(&mut self, key: &K, timestamp: Timestamp) {
        if let Some(keys) = self.folding_states.get_mut(&timestamp) {
            keys.shift_remove(key);
            if keys.is_empty() {
                self.folding_states.remove(&timestamp);
            }
        }
    }

    pub fn resumable_timestamp(&self) -> Option<Timestamp> {
        self.folding_states.keys().next().copied()
    }

    pub fn resumable_signatures(&self) -> impl Iterator<Item = Tuple> + '_ {
        self.folding_states
            .values()
            .next()
            .into_iter()
            .flatten()
            .map(MemoryKey::to_signature)
    }

    /// Resumes every key registered at `timestamp`, returning the presence diffs
    /// grouped by signature.
    ///
    /// # Panics
    ///
    /// Panics if `timestamp` is not the resumable timestamp.
    pub fn resume_at(&mut self, timestamp: Timestamp) -> IndexMap<Tuple, IndexMap<Tuple, Diff>> {
        let current = self.resumable_timestamp();
        assert_eq!(
            current,
            Some(timestamp),
            "resume_at({timestamp}) called but the memory resumes at {current:?}"
        );
        let keys = self.folding_states.remove(&timestamp).unwrap_or_default();
        let mut result = IndexMap::new();
        for key in keys {
            let Some(memory) = self.memories.get_mut(&key) else {
                continue;
            };
            let diffs = memory.resume_at(timestamp);
            let next = memory.resumable_timestamp();
            let empty = memory.is_empty();
            if let Some(next) = next {
                self.folding_states.entry(next).or_default().insert(key.clone());
            }
            if empty {
                self.memories.shift_remove(&key);
            }
            if !diffs.is_empty() {
                result.insert(key.to_signature(), diffs);
            }
        }
        result
    }

    /// Tuples with the given signature that are present at infinity.
    pub fn get(&self, signature: &Tuple) -> impl Iterator<Item = &Tuple> + '_ {
        self.memories
            .get(&K::from_signature(signature))
            .into_iter()
            .flat_map(TimelyMemory::tuples_at_infinity)
    }

    pub fn get_with_timeline(&self, signature: &Tuple) -> Option<&IndexMap<Tuple, Timeline>> {
        self.memories
            .get(&K::from_signature(signature))
            .map(TimelyMemory::timelines)
    }

    pub fn is_present_at_infinity(&self, signature: &Tuple) -> bool {
        self.memories
            .get(&K::from_signature(signature))
            .is_some_and(|memory| memory.count_at_infinity() > 0)
    }

    pub fn signatures(&self) -> impl Iterator<Item = Tuple> + '_ {
        self.memories.keys().map(MemoryKey::to_signature)
    }

    /// Number of distinct signatures.
    pub fn keyset_size(&self) -> usize {
        self.memories.len()
    }

    /// Number of distinct tuples across all signatures.
    pub fn total_size(&self) -> usize {
        self.memories.values().map(TimelyMemory::len).sum()
    }

    /// All tuples present at infinity.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.memories
            .values()
            .flat_map(TimelyMemory::tuples_at_infinity)
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn clear(&mut self) {
        self.memories.clear();
        self.folding_states.clear();
    }
}

/// A masked memory whose key type is chosen from the width of the mask.
#[derive(Debug, Clone)]
pub enum MaskedMemory {
    Nullary(NullaryMaskedMemory),
    Unary(UnaryMaskedMemory),
    Default(DefaultMaskedMemory),
}

macro_rules! dispatch {
    ($self:expr, $memory:ident => $body:expr) => {
        match $self {
            MaskedMemory::Nullary($memory) => $body,
            MaskedMemory::Unary($memory) => $body,
            MaskedMemory::Default($memory) => $body,
        }
    };
}

impl MaskedMemory {
    pub fn new(mask: TupleMask, lazy: bool) -> Self {
        match mask.len() {
            0 => Self::Nullary(TimelyMaskedMemory::new(mask, lazy)),
            1 => Self::Unary(TimelyMaskedMemory::new(mask, lazy)),
            _ => Self::Default(TimelyMaskedMemory::new(mask, lazy)),
        }
    }

    pub fn mask(&self) -> &TupleMask {
        dispatch!(self, memory => memory.mask())
    }

    pub fn add_with_timestamp(&mut self, tuple: &Tuple, timestamp: Timestamp) -> Diff {
        dispatch!(self, memory => memory.add_with_timestamp(tuple, timestamp))
    }

    pub fn remove_with_timestamp(&mut self, tuple: &Tuple, timestamp: Timestamp) -> Diff {
        dispatch!(self, memory => memory.remove_with_timestamp(tuple, timestamp))
    }

    pub fn update_with_timestamp(
        &mut self,
        direction: Direction,
        tuple: &Tuple,
        timestamp: Timestamp,
    ) -> Diff {
        dispatch!(self, memory => memory.update_with_timestamp(direction, tuple, timestamp))
    }

    pub fn resumable_timestamp(&self) -> Option<Timestamp> {
        dispatch!(self, memory => memory.resumable_timestamp())
    }

    /// Signatures with deferred folding at [`MaskedMemory::resumable_timestamp`].
    pub fn resumable_signatures(&self) -> Vec<Tuple> {
        dispatch!(self, memory => memory.resumable_signatures().collect())
    }

    pub fn resume_at(&mut self, timestamp: Timestamp) -> IndexMap<Tuple, IndexMap<Tuple, Diff>> {
        dispatch!(self, memory => memory.resume_at(timestamp))
    }

    pub fn get(&self, signature: &Tuple) -> Vec<&Tuple> {
        dispatch!(self, memory => memory.get(signature).collect())
    }

    pub fn get_with_timeline(&self, signature: &Tuple) -> Option<&IndexMap<Tuple, Timeline>> {
        dispatch!(self, memory => memory.get_with_timeline(signature))
    }

    pub fn is_present_at_infinity(&self, signature: &Tuple) -> bool {
        dispatch!(self, memory => memory.is_present_at_infinity(signature))
    }

    pub fn signatures(&self) -> Vec<Tuple> {
        dispatch!(self, memory => memory.signatures().collect())
    }

    pub fn keyset_size(&self) -> usize {
        dispatch!(self, memory => memory.keyset_size())
    }

    pub fn total_size(&self) -> usize {
        dispatch!(self, memory => memory.total_size())
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, memory => memory.is_empty())
    }

    pub fn clear(&mut self) {
        dispatch!(self, memory => memory.clear());
    }

    /// Replays the timelines of `other` into this memory.
    pub fn initialize_with(&mut self, other: &MaskedMemory) {
        for signature in other.signatures() {
            let Some(timelines) = other.get_with_timeline(&signature) else {
                continue;
            };
            for (tuple, timeline) in timelines {
                for signed in timeline.as_change_sequence() {
                    self.update_with_timestamp(signed.direction, tuple, signed.timestamp);
                }
            }
        }
    }
}
