// Copyright © 2024 Pathway

use std::collections::{HashMap, HashSet};

use id_arena::Arena;
use rand::rngs::StdRng;
use rand::Rng;

use reteflow_engine::engine::itc::TcObserver;
use reteflow_engine::engine::{NodeId, Timestamp, Tuple, Value};

pub fn tuple(values: &[i64]) -> Tuple {
    values.iter().copied().map(Value::from).collect()
}

pub fn ts(value: u64) -> Timestamp {
    Timestamp(value)
}

/// Fresh node handles, for driving components that do not own the nodes.
pub fn node_ids(count: usize) -> Vec<NodeId> {
    let mut arena: Arena<(), NodeId> = Arena::new();
    (0..count).map(|_| arena.alloc(())).collect()
}

pub fn random_edges(rng: &mut StdRng, nodes: usize, edges: usize) -> Vec<(usize, usize)> {
    (0..edges)
        .map(|_| (rng.random_range(0..nodes), rng.random_range(0..nodes)))
        .collect()
}

/// Pairs connected by a path of at least one edge.
pub fn brute_force_closure(nodes: usize, edges: &[(usize, usize)]) -> HashSet<(usize, usize)> {
    let mut successors: HashMap<usize, Vec<usize>> = HashMap::new();
    for (source, target) in edges {
        successors.entry(*source).or_default().push(*target);
    }
    let mut closure = HashSet::new();
    for start in 0..nodes {
        let mut stack: Vec<usize> = successors.get(&start).cloned().unwrap_or_default();
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                closure.insert((start, node));
                stack.extend(successors.get(&node).into_iter().flatten().copied());
            }
        }
    }
    closure
}

/// Keeps the relation described by the received notifications and fails on redundant ones.
#[derive(Debug)]
pub struct RecordingObserver<V> {
    pub relation: HashSet<(V, V)>,
    pub inserted: Vec<(V, V)>,
    pub deleted: Vec<(V, V)>,
}

impl<V> Default for RecordingObserver<V> {
    fn default() -> Self {
        Self {
            relation: HashSet::new(),
            inserted: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<V> RecordingObserver<V> {
    pub fn reset_log(&mut self) {
        self.inserted.clear();
        self.deleted.clear();
    }
}

impl<V: Clone + Eq + std::hash::Hash + std::fmt::Debug> TcObserver<V> for RecordingObserver<V> {
    fn tuple_inserted(&mut self, source: &V, target: &V) {
        assert!(
            self.relation.insert((source.clone(), target.clone())),
            "duplicate insertion of ({source:?}, {target:?})"
        );
        self.inserted.push((source.clone(), target.clone()));
    }

    fn tuple_deleted(&mut self, source: &V, target: &V) {
        assert!(
            self.relation.remove(&(source.clone(), target.clone())),
            "deletion of ({source:?}, {target:?}) that was never inserted"
        );
        self.deleted.push((source.clone(), target.clone()));
    }
}
