// Copyright © 2024 Pathway

use std::cell::RefCell;
use std::rc::Rc;

use reteflow_engine::engine::itc::scc::{
    is_reachable, shortest_path, strongly_connected_components, topological_sort,
};
use reteflow_engine::engine::itc::{
    Adjacency, BiDirectionalGraphDataSource, BiDirectionalWrapper, Graph, GraphDataSource,
    GraphObserver,
};

#[derive(Default)]
struct EventLog {
    events: Vec<String>,
}

impl GraphObserver<&'static str> for EventLog {
    fn edge_inserted(&mut self, source: &&'static str, target: &&'static str) {
        self.events.push(format!("+{source}{target}"));
    }

    fn edge_deleted(&mut self, source: &&'static str, target: &&'static str) {
        self.events.push(format!("-{source}{target}"));
    }

    fn node_inserted(&mut self, node: &&'static str) {
        self.events.push(format!("+{node}"));
    }

    fn node_deleted(&mut self, node: &&'static str) {
        self.events.push(format!("-{node}"));
    }
}

#[test]
fn test_adjacency_multiplicities() {
    let mut adjacency = Adjacency::default();
    assert_eq!(adjacency.insert_edge(&1, &2), 1);
    assert_eq!(adjacency.insert_edge(&1, &2), 2);
    assert_eq!(adjacency.insert_edge_with_multiplicity(&2, &2, 3), 3);
    assert_eq!(adjacency.edge_count(&1, &2), 2);
    assert_eq!(adjacency.self_loop_count(&2), 3);
    assert_eq!(adjacency.node_count(), 2);

    assert_eq!(adjacency.delete_edge(&1, &2), Some(1));
    assert_eq!(adjacency.delete_edge(&1, &2), Some(0));
    assert_eq!(adjacency.delete_edge(&1, &2), None);
    assert_eq!(adjacency.edge_count(&1, &2), 0);
    assert_eq!(adjacency.source_nodes(&2).count(), 1);
    assert_eq!(adjacency.delete_all_edges(&2, &2), 3);
    assert!(!adjacency.has_edges(&2));
}

#[test]
fn test_graph_notifies_observers() {
    let mut graph = Graph::new();
    let log = Rc::new(RefCell::new(EventLog::default()));
    let handle = graph.attach_observer(log.clone());

    graph.insert_edge("a", "b");
    graph.insert_edge("a", "b");
    graph.insert_node("a");
    assert!(graph.delete_edge_if_exists(&"a", &"b"));
    graph.delete_node(&"a");
    assert_eq!(
        log.borrow().events,
        vec!["+a", "+b", "+ab", "+ab", "-ab", "-ab", "-a"]
    );

    assert!(graph.detach_observer(handle));
    graph.insert_node("c");
    assert_eq!(log.borrow().events.len(), 7);
    assert!(!graph.detach_observer(handle));
}

#[test]
#[should_panic(expected = "does not exist")]
fn test_deleting_missing_edge_panics() {
    let mut graph = Graph::new();
    graph.insert_node(1);
    graph.insert_node(2);
    graph.delete_edge_that_exists(&1, &2);
}

#[test]
#[should_panic(expected = "not in the graph")]
fn test_deleting_unknown_node_panics() {
    let mut graph: Graph<u32> = Graph::new();
    graph.delete_node(&7);
}

#[test]
fn test_bidirectional_wrapper_follows_source() {
    let mut forward = Adjacency::default();
    forward.insert_edge(&1, &2);
    forward.insert_edge(&3, &2);
    forward.insert_node(4);

    let mut wrapper = BiDirectionalWrapper::new(&forward);
    let mut sources: Vec<u32> = wrapper.source_nodes(&2).map(|(node, _)| *node).collect();
    sources.sort_unstable();
    assert_eq!(sources, vec![1, 3]);
    assert_eq!(wrapper.all_nodes().count(), 4);

    wrapper.edge_inserted(&4, &2);
    wrapper.edge_deleted(&1, &2);
    let mut sources: Vec<u32> = wrapper.source_nodes(&2).map(|(node, _)| *node).collect();
    sources.sort_unstable();
    assert_eq!(sources, vec![3, 4]);
}

#[test]
fn test_tarjan_components_in_reverse_topological_order() {
    let edges = [(1, 2), (2, 1), (2, 3), (3, 4), (4, 3), (4, 5)];
    let components = strongly_connected_components([1, 2, 3, 4, 5], |node: &u32| {
        edges
            .iter()
            .filter(|(source, _)| source == node)
            .map(|(_, target)| *target)
            .collect::<Vec<_>>()
    });
    let mut normalized: Vec<Vec<u32>> = components
        .into_iter()
        .map(|mut component| {
            component.sort_unstable();
            component
        })
        .collect();
    assert_eq!(normalized.len(), 3);
    assert_eq!(normalized.remove(0), vec![5]);
    assert_eq!(normalized.remove(0), vec![3, 4]);
    assert_eq!(normalized.remove(0), vec![1, 2]);
}

#[test]
fn test_topological_sort_and_paths() {
    let edges = [(3, 1), (1, 2), (3, 2), (2, 4)];
    let successors = |node: &u32| {
        edges
            .iter()
            .filter(|(source, _)| source == node)
            .map(|(_, target)| *target)
            .collect::<Vec<_>>()
    };
    assert_eq!(topological_sort([1, 2, 3, 4], successors), vec![3, 1, 2, 4]);
    assert_eq!(shortest_path(&3, &4, successors), Some(vec![3, 2, 4]));
    assert_eq!(shortest_path(&4, &3, successors), None);
    assert!(is_reachable(&1, &4, successors));
    assert!(!is_reachable(&1, &1, successors));
}
