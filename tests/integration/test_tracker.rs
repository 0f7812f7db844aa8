// Copyright © 2024 Pathway

use reteflow_engine::engine::communication::{
    CommunicationTracker, MailboxId, MessageSelector, NodeTraits, Proxy,
};
use reteflow_engine::engine::itc::GraphDataSource;
use reteflow_engine::engine::{NodeId, TimestampTransformation, TimelyConfiguration};

use super::helpers::{node_ids, ts};

fn tracker_with(
    configuration: TimelyConfiguration,
    traits: &[NodeTraits],
) -> (CommunicationTracker, Vec<NodeId>) {
    let mut tracker = CommunicationTracker::new(configuration);
    let nodes = node_ids(traits.len());
    for (node, traits) in nodes.iter().zip(traits) {
        tracker.register_node(*node, *traits);
    }
    (tracker, nodes)
}

fn identifier(tracker: &CommunicationTracker, node: NodeId) -> i64 {
    tracker
        .group_of(node)
        .map(|group| group.identifier())
        .unwrap_or_else(|| panic!("{node:?} has no group"))
}

fn drain(tracker: &mut CommunicationTracker) -> Vec<(MailboxId, u64)> {
    let mut deliveries = Vec::new();
    while let Some((mailbox, timestamp)) = tracker.next_delivery() {
        deliveries.push((mailbox, timestamp.0));
    }
    deliveries
}

#[test]
fn test_chain_is_ordered_topologically() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default(),
        &[NodeTraits::standard(); 3],
    );
    let [a, b, c] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    tracker.register_dependency(b, c);
    tracker.register_dependency(b, c);

    assert!(identifier(&tracker, a) < identifier(&tracker, b));
    assert!(identifier(&tracker, b) < identifier(&tracker, c));
    assert!(!tracker.is_in_recursive_group(b));
    assert!(!tracker.are_in_same_group(a, b));
    assert_eq!(tracker.preprocessor(a, b), None);
    assert_eq!(tracker.dependency_graph().adjacency().edge_count(&b, &c), 1);

    tracker.notify_has_message(MailboxId::new(c, 0), ts(0).into());
    tracker.notify_has_message(MailboxId::new(a, 0), ts(3).into());
    tracker.notify_has_message(MailboxId::new(b, 1), ts(1).into());
    assert!(!tracker.is_empty());
    assert_eq!(
        drain(&mut tracker),
        vec![
            (MailboxId::new(a, 0), 3),
            (MailboxId::new(b, 1), 1),
            (MailboxId::new(c, 0), 0)
        ]
    );
    assert!(tracker.is_empty());
}

#[test]
fn test_source_added_late_moves_target_forward() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default(),
        &[NodeTraits::standard(); 4],
    );
    let [a, b, c, d] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    tracker.register_dependency(c, d);
    assert!(identifier(&tracker, d) > identifier(&tracker, b));

    tracker.register_dependency(d, b);
    assert!(identifier(&tracker, b) > identifier(&tracker, d));
    assert!(identifier(&tracker, a) < identifier(&tracker, b));
}

#[test]
fn test_recursive_group_and_proxies() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default(),
        &[
            NodeTraits::standard(),
            NodeTraits::production(),
            NodeTraits::standard(),
            NodeTraits::standard(),
        ],
    );
    let [a, b, c, d] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    tracker.register_dependency(b, c);
    tracker.register_dependency(c, b);
    tracker.register_dependency(c, d);

    assert!(tracker.are_in_same_group(b, c));
    assert!(tracker.is_in_recursive_group(c));
    assert!(!tracker.is_in_recursive_group(a));
    assert!(!tracker.is_in_recursive_group(d));
    assert!(identifier(&tracker, a) < identifier(&tracker, b));
    assert!(identifier(&tracker, c) < identifier(&tracker, d));

    assert!(tracker.is_recursion_cut_point(c, b));
    assert!(!tracker.is_recursion_cut_point(b, c));
    assert_eq!(tracker.preprocessor(a, b), None);
    assert_eq!(tracker.preprocessor(b, c), None);
    assert_eq!(
        tracker.preprocessor(c, b),
        Some(TimestampTransformation::Increment)
    );
    assert_eq!(tracker.preprocessor(c, d), Some(TimestampTransformation::Reset));

    let proxy = tracker.proxify(c, MailboxId::new(d, 0));
    assert_eq!(proxy.mailbox(), MailboxId::new(d, 0));
    assert_eq!(proxy.apply(ts(5)), ts(0));
    let proxy = tracker.proxify(c, MailboxId::new(b, 0));
    assert_eq!(proxy.apply(ts(5)), ts(6));
    assert_eq!(
        tracker.proxify(a, MailboxId::new(b, 0)),
        Proxy::Direct(MailboxId::new(b, 0))
    );

    tracker.unregister_dependency(c, b);
    assert!(!tracker.are_in_same_group(b, c));
    assert!(!tracker.is_in_recursive_group(b));
    assert_eq!(tracker.preprocessor(c, d), None);
    let stale = Proxy::new(MailboxId::new(d, 0), Some(TimestampTransformation::Reset));
    assert_eq!(
        tracker.reproxify(c, &stale),
        Proxy::Direct(MailboxId::new(d, 0))
    );
}

#[test]
fn test_self_loop_makes_group_recursive() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default(),
        &[NodeTraits::production(), NodeTraits::standard()],
    );
    let [a, b] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    assert!(!tracker.is_in_recursive_group(a));
    tracker.register_dependency(a, a);
    assert!(tracker.is_in_recursive_group(a));
    assert_eq!(
        tracker.preprocessor(a, a),
        Some(TimestampTransformation::Increment)
    );
    assert_eq!(tracker.preprocessor(a, b), Some(TimestampTransformation::Reset));
    tracker.unregister_dependency(a, a);
    assert!(!tracker.is_in_recursive_group(a));
}

#[test]
fn test_timestamps_order_mailboxes_of_a_group() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default(),
        &[NodeTraits::standard(), NodeTraits::production()],
    );
    let [a, b] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    tracker.register_dependency(b, a);

    tracker.notify_has_message(MailboxId::new(b, 0), ts(2).into());
    tracker.notify_has_message(MailboxId::new(a, 0), ts(1).into());
    tracker.notify_has_message(MailboxId::new(a, 1), ts(2).into());

    assert_eq!(tracker.next_delivery(), Some((MailboxId::new(a, 0), ts(1))));
    let state = tracker
        .group_of(a)
        .map(|group| (group.is_delivering(), group.currently_delivered()));
    assert_eq!(state, Some((true, Some(ts(1)))));

    // messages arriving during delivery join the group being delivered
    tracker.notify_has_message(MailboxId::new(b, 1), ts(1).into());
    assert_eq!(
        drain(&mut tracker),
        vec![
            (MailboxId::new(b, 1), 1),
            (MailboxId::new(a, 1), 2),
            (MailboxId::new(b, 0), 2)
        ]
    );
}

#[test]
fn test_faithful_mode_ranks_recursive_groups() {
    let traits = [NodeTraits::standard(), NodeTraits::production()];
    let expected_orders = [
        (TimelyConfiguration::default(), [0, 1]),
        (TimelyConfiguration::faithful(), [1, 0]),
    ];
    for (configuration, order) in expected_orders {
        let (mut tracker, nodes) = tracker_with(configuration, &traits);
        let [a, b] = nodes[..] else { unreachable!() };
        tracker.register_dependency(b, a);
        tracker.register_dependency(a, b);

        tracker.notify_has_message(MailboxId::new(a, 0), ts(0).into());
        tracker.notify_has_message(MailboxId::new(b, 0), ts(0).into());
        let delivered: Vec<NodeId> = drain(&mut tracker)
            .into_iter()
            .map(|(mailbox, _)| mailbox.node)
            .collect();
        assert_eq!(delivered, vec![nodes[order[0]], nodes[order[1]]]);
    }
}

#[test]
fn test_recomputation_keeps_pending_mailboxes() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::faithful(),
        &[
            NodeTraits::production(),
            NodeTraits::standard(),
            NodeTraits::standard(),
        ],
    );
    let [a, b, c] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    tracker.register_dependency(b, c);
    tracker.notify_has_message(MailboxId::new(b, 0), ts(0).into());
    tracker.notify_has_message(MailboxId::new(c, 0), ts(4).into());

    tracker.register_dependency(c, a);
    assert!(tracker.are_in_same_group(a, c));
    assert_eq!(tracker.groups().count(), 1);
    assert_eq!(
        drain(&mut tracker),
        vec![(MailboxId::new(b, 0), 0), (MailboxId::new(c, 0), 4)]
    );
}

#[test]
fn test_lost_messages_deactivate_group() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default(),
        &[NodeTraits::standard(); 2],
    );
    let [a, b] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    let mailbox = MailboxId::new(b, 0);
    tracker.notify_has_message(mailbox, ts(0).into());
    tracker.notify_has_message(mailbox, ts(1).into());
    tracker.notify_lost_all_messages(mailbox, ts(0).into());
    assert!(!tracker.is_empty());
    tracker.notify_lost_all_messages(mailbox, ts(1).into());
    assert!(tracker.is_empty());
    assert_eq!(tracker.next_delivery(), None);

    tracker.notify_has_message(mailbox, ts(2).into());
    tracker.clear();
    assert!(tracker.is_empty());
    assert_eq!(tracker.group_of(b).map(|group| group.is_empty()), Some(true));
}

#[test]
#[should_panic(expected = "unsupported message selector")]
fn test_timeless_selector_is_rejected() {
    let (mut tracker, nodes) =
        tracker_with(TimelyConfiguration::default(), &[NodeTraits::standard()]);
    tracker.notify_has_message(MailboxId::new(nodes[0], 0), MessageSelector::Timeless);
}

#[test]
#[should_panic(expected = "was not registered")]
fn test_losing_unregistered_mailbox_panics() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default(),
        &[NodeTraits::standard(); 2],
    );
    tracker.notify_has_message(MailboxId::new(nodes[0], 0), ts(0).into());
    tracker.notify_lost_all_messages(MailboxId::new(nodes[0], 1), ts(0).into());
}

#[test]
fn test_decreasing_timestamp_during_delivery_is_delivered() {
    let (mut tracker, nodes) = tracker_with(
        TimelyConfiguration::default().with_timestamp_monitoring(true),
        &[NodeTraits::standard(), NodeTraits::production()],
    );
    let [a, b] = nodes[..] else { unreachable!() };
    tracker.register_dependency(a, b);
    tracker.register_dependency(b, a);

    tracker.notify_has_message(MailboxId::new(a, 0), ts(5).into());
    assert_eq!(tracker.next_delivery(), Some((MailboxId::new(a, 0), ts(5))));

    // logged as a violation, the mailbox is still delivered
    tracker.notify_has_message(MailboxId::new(b, 0), ts(2).into());
    assert_eq!(tracker.next_delivery(), Some((MailboxId::new(b, 0), ts(2))));
    assert_eq!(tracker.next_delivery(), None);
    assert!(tracker.is_empty());
}
