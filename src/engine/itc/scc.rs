// Copyright © 2024 Pathway

//! Whole-graph algorithms used when incremental maintenance has to fall back to recomputation.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use super::GraphNode;

struct Frame<V> {
    node: V,
    successors: std::vec::IntoIter<V>,
}

/// Strongly connected components, using an iterative version of Tarjan's algorithm.
///
/// Components are returned in reverse topological order: a component never has edges into a
/// component that comes after it.
pub fn strongly_connected_components<V, F, I>(
    nodes: impl IntoIterator<Item = V>,
    mut successors: F,
) -> Vec<Vec<V>>
where
    V: GraphNode,
    F: FnMut(&V) -> I,
    I: IntoIterator<Item = V>,
{
    let mut next_index = 0;
    let mut index: HashMap<V, usize> = HashMap::new();
    let mut lowlink: HashMap<V, usize> = HashMap::new();
    let mut on_stack: HashSet<V> = HashSet::new();
    let mut stack: Vec<V> = Vec::new();
    let mut call_stack: Vec<Frame<V>> = Vec::new();
    let mut components = Vec::new();

    let mut visit = |node: V,
                     index: &mut HashMap<V, usize>,
                     lowlink: &mut HashMap<V, usize>,
                     on_stack: &mut HashSet<V>,
                     stack: &mut Vec<V>,
                     call_stack: &mut Vec<Frame<V>>| {
        index.insert(node.clone(), next_index);
        lowlink.insert(node.clone(), next_index);
        next_index += 1;
        on_stack.insert(node.clone());
        stack.push(node.clone());
        let successors: Vec<V> = successors(&node).into_iter().collect();
        call_stack.push(Frame {
            node,
            successors: successors.into_iter(),
        });
    };

    for root in nodes {
        if index.contains_key(&root) {
            continue;
        }
        visit(
            root,
            &mut index,
            &mut lowlink,
            &mut on_stack,
            &mut stack,
            &mut call_stack,
        );
        while let Some(frame) = call_stack.last_mut() {
            if let Some(next) = frame.successors.next() {
                if !index.contains_key(&next) {
                    visit(
                        next,
                        &mut index,
                        &mut lowlink,
                        &mut on_stack,
                        &mut stack,
                        &mut call_stack,
                    );
                } else if on_stack.contains(&next) {
                    let low = lowlink[&frame.node].min(index[&next]);
                    lowlink.insert(frame.node.clone(), low);
                }
                continue;
            }

            let node = frame.node.clone();
            call_stack.pop();
            if let Some(parent) = call_stack.last() {
                let low = lowlink[&parent.node].min(lowlink[&node]);
                lowlink.insert(parent.node.clone(), low);
            }
            if lowlink[&node] == index[&node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(&member);
                    let done = member == node;
                    component.push(member);
                    if done {
                        break;
                    }
                }
                component.reverse();
                components.push(component);
            }
        }
    }

    components
}

/// Orders `nodes` so that every edge points forward, using Kahn's algorithm.
///
/// Nodes whose order is not determined because they lie on a cycle are appended at the end
/// in the order of `nodes`. Successors outside of `nodes` are ignored.
pub fn topological_sort<V, F, I>(nodes: impl IntoIterator<Item = V>, mut successors: F) -> Vec<V>
where
    V: GraphNode,
    F: FnMut(&V) -> I,
    I: IntoIterator<Item = V>,
{
    let mut in_degree: IndexMap<V, usize> = nodes.into_iter().map(|node| (node, 0)).collect();
    let mut edges: HashMap<V, Vec<V>> = HashMap::new();
    for node in in_degree.keys().cloned().collect::<Vec<_>>() {
        let targets: Vec<V> = successors(&node)
            .into_iter()
            .filter(|target| in_degree.contains_key(target))
            .collect();
        for target in &targets {
            in_degree[target] += 1;
        }
        edges.insert(node, targets);
    }

    let mut queue: VecDeque<V> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| node.clone())
        .collect();
    let mut sorted = Vec::with_capacity(in_degree.len());
    let mut placed: HashSet<V> = HashSet::new();

    while let Some(node) = queue.pop_front() {
        for target in edges.get(&node).into_iter().flatten() {
            let degree = &mut in_degree[target];
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(target.clone());
            }
        }
        placed.insert(node.clone());
        sorted.push(node);
    }

    if sorted.len() != in_degree.len() {
        sorted.extend(
            in_degree
                .keys()
                .filter(|node| !placed.contains(*node))
                .cloned(),
        );
    }
    sorted
}

/// Breadth-first search for a path of at least one edge from `source` to `target`.
///
/// Returns the visited nodes in order, both endpoints included.
pub fn shortest_path<V, F, I>(source: &V, target: &V, mut successors: F) -> Option<Vec<V>>
where
    V: GraphNode,
    F: FnMut(&V) -> I,
    I: IntoIterator<Item = V>,
{
    let mut parent: HashMap<V, V> = HashMap::new();
    let mut queue: VecDeque<V> = VecDeque::new();
    queue.push_back(source.clone());
    while let Some(node) = queue.pop_front() {
        for next in successors(&node) {
            if parent.contains_key(&next) {
                continue;
            }
            parent.insert(next.clone(), node.clone());
            if next == *target {
                let mut path = vec![next];
                let mut current = node.clone();
                while current != *source {
                    let previous = parent[&current].clone();
                    path.push(current);
                    current = previous;
                }
                path.push(source.clone());
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}

pub fn is_reachable<V, F, I>(source: &V, target: &V, successors: F) -> bool
where
    V: GraphNode,
    F: FnMut(&V) -> I,
    I: IntoIterator<Item = V>,
{
    shortest_path(source, target, successors).is_some()
}
