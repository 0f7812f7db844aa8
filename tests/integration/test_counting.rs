// Copyright © 2024 Pathway

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use reteflow_engine::engine::itc::counting::TcChange;
use reteflow_engine::engine::itc::{Adjacency, CountingAlg};
use reteflow_engine::engine::Direction;

use super::helpers::brute_force_closure;

fn closure_of(alg: &CountingAlg<usize>, nodes: usize) -> HashSet<(usize, usize)> {
    (0..nodes)
        .flat_map(|source| {
            alg.reachable_targets(&source)
                .map(move |target| (source, *target))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn test_derivation_counts() {
    let mut graph = Adjacency::default();
    graph.insert_edge(&1, &2);
    graph.insert_edge(&1, &3);
    graph.insert_edge(&2, &4);
    graph.insert_edge(&3, &4);
    let alg = CountingAlg::new(&graph);

    assert!(alg.is_reachable(&1, &4));
    assert_eq!(alg.derivation_count(&1, &4), 2);
    assert_eq!(alg.derivation_count(&2, &4), 1);
    assert!(!alg.is_reachable(&4, &1));
    let mut sources: Vec<i32> = alg.reachable_sources(&4).copied().collect();
    sources.sort_unstable();
    assert_eq!(sources, vec![1, 2, 3]);
}

#[test]
fn test_changes_only_on_appearance_and_disappearance() {
    let mut graph = Adjacency::default();
    graph.insert_edge(&"a", &"b");
    graph.insert_edge(&"c", &"d");
    let mut alg = CountingAlg::new(&graph);

    let mut changes = Vec::new();
    graph.insert_edge(&"b", &"c");
    alg.edge_inserted(&graph, &"b", &"c", &mut changes);
    let inserted: HashSet<(&str, &str)> = changes
        .iter()
        .map(|change: &TcChange<&str>| {
            assert_eq!(change.direction, Direction::Insert);
            (change.source, change.target)
        })
        .collect();
    assert_eq!(
        inserted,
        HashSet::from([("b", "c"), ("b", "d"), ("a", "c"), ("a", "d")])
    );

    changes.clear();
    graph.insert_edge(&"a", &"c");
    alg.edge_inserted(&graph, &"a", &"c", &mut changes);
    assert!(changes.is_empty());
    assert_eq!(alg.derivation_count(&"a", &"c"), 2);

    graph.delete_edge(&"b", &"c");
    alg.edge_deleted(&graph, &"b", &"c", &mut changes);
    let deleted: HashSet<(&str, &str)> = changes
        .iter()
        .map(|change| (change.source, change.target))
        .collect();
    assert_eq!(deleted, HashSet::from([("b", "c"), ("b", "d")]));
    assert!(alg.is_reachable(&"a", &"d"));
}

#[test]
fn test_random_dags_match_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..20 {
        let nodes = 12;
        let mut graph = Adjacency::default();
        for node in 0..nodes {
            graph.insert_node(node);
        }
        let mut alg = CountingAlg::new(&graph);
        let mut edges = Vec::new();
        let mut changes = Vec::new();
        for _ in 0..30 {
            let source = rng.random_range(0..nodes - 1);
            let target = rng.random_range(source + 1..nodes);
            if graph.insert_edge(&source, &target) == 1 {
                alg.edge_inserted(&graph, &source, &target, &mut changes);
            }
            edges.push((source, target));
        }
        assert_eq!(closure_of(&alg, nodes), brute_force_closure(nodes, &edges));

        for _ in 0..15 {
            let index = rng.random_range(0..edges.len());
            let (source, target) = edges.swap_remove(index);
            if graph.delete_edge(&source, &target) == Some(0) {
                alg.edge_deleted(&graph, &source, &target, &mut changes);
            }
        }
        assert_eq!(closure_of(&alg, nodes), brute_force_closure(nodes, &edges));
    }
}
