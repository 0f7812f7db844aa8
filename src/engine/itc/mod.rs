// Copyright © 2024 Pathway

//! Incremental transitive closure over directed multigraphs.
//!
//! [`IncSccAlg`] keeps the strongly connected components of an observed [`Graph`] up to date,
//! and answers reachability queries through a [`CountingAlg`] running on the acyclic graph of
//! components.

use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use derivative::Derivative;

pub mod counting;
pub mod graph;
pub mod incscc;
pub mod partition;
pub mod scc;

pub use self::counting::CountingAlg;
pub use self::graph::{Adjacency, BiDirectionalWrapper, Graph};
pub use self::incscc::IncSccAlg;
pub use self::partition::{Partition, PartitionId};

pub trait GraphNode: Clone + Eq + Hash + Debug + 'static {}

impl<T: Clone + Eq + Hash + Debug + 'static> GraphNode for T {}

/// Read access to a directed multigraph. Multiplicities are always positive.
pub trait GraphDataSource<V: GraphNode> {
    fn all_nodes(&self) -> impl Iterator<Item = &V> + '_;

    fn target_nodes(&self, source: &V) -> impl Iterator<Item = (&V, usize)> + '_;

    fn edge_count(&self, source: &V, target: &V) -> usize {
        self.target_nodes(source)
            .find_map(|(node, count)| (node == target).then_some(count))
            .unwrap_or(0)
    }
}

pub trait BiDirectionalGraphDataSource<V: GraphNode>: GraphDataSource<V> {
    fn source_nodes(&self, target: &V) -> impl Iterator<Item = (&V, usize)> + '_;
}

/// Receives structural changes of a [`Graph`], after the change has been applied.
///
/// Inserting an edge of multiplicity `n` produces `n` calls of [`edge_inserted`](Self::edge_inserted).
pub trait GraphObserver<V> {
    fn edge_inserted(&mut self, source: &V, target: &V);
    fn edge_deleted(&mut self, source: &V, target: &V);
    fn node_inserted(&mut self, node: &V);
    fn node_deleted(&mut self, node: &V);
}

/// Receives changes of a transitive closure relation.
pub trait TcObserver<V> {
    fn tuple_inserted(&mut self, source: &V, target: &V);
    fn tuple_deleted(&mut self, source: &V, target: &V);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverHandle(usize);

#[derive(Derivative)]
#[derivative(Default(bound = ""))]
pub(crate) struct Observers<O: ?Sized> {
    next_handle: usize,
    entries: Vec<(ObserverHandle, Rc<RefCell<O>>)>,
}

impl<O: ?Sized> Observers<O> {
    pub fn attach(&mut self, observer: Rc<RefCell<O>>) -> ObserverHandle {
        let handle = ObserverHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push((handle, observer));
        handle
    }

    pub fn detach(&mut self, handle: ObserverHandle) -> bool {
        let len_before = self.entries.len();
        self.entries.retain(|(other, _)| *other != handle);
        self.entries.len() != len_before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn notify(&self, mut callback: impl FnMut(&mut O)) {
        for (_, observer) in &self.entries {
            callback(&mut *observer.borrow_mut());
        }
    }
}
