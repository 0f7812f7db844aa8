// Copyright © 2024 Pathway

use indexmap::IndexMap;

use crate::engine::communication::NodeTraits;
use crate::engine::{Direction, Timeline, Timestamp, Tuple};

/// Messages produced by a node during one call, routed by the network afterwards.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(Direction, Tuple, Timestamp)>,
}

impl Outbox {
    pub fn send(&mut self, direction: Direction, tuple: Tuple, timestamp: Timestamp) {
        self.messages.push((direction, tuple, timestamp));
    }

    /// Sends `count` copies of `tuple`, as deletions if `count` is negative.
    pub fn send_count(&mut self, tuple: &Tuple, count: isize, timestamp: Timestamp) {
        let Some(direction) = Direction::from_sign(count) else {
            return;
        };
        for _ in 0..count.unsigned_abs() {
            self.send(direction, tuple.clone(), timestamp);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn take(&mut self) -> Vec<(Direction, Tuple, Timestamp)> {
        std::mem::take(&mut self.messages)
    }
}

/// The computation performed by a node of the network.
pub trait Node {
    fn traits(&self) -> NodeTraits;

    /// Number of input ports, each of which gets its own mailbox.
    fn input_ports(&self) -> usize;

    /// Processes the messages delivered to `port` at `timestamp`. A tuple may appear with a
    /// negative multiplicity, meaning deletions.
    fn batch_update(
        &mut self,
        port: usize,
        updates: &[(Tuple, isize)],
        timestamp: Timestamp,
        outbox: &mut Outbox,
    );

    /// Collects the tuples the node currently holds.
    fn pull_into(&self, collector: &mut Vec<Tuple>);

    /// Collects the tuples the node holds together with their timelines.
    fn pull_into_with_timeline(&self, collector: &mut IndexMap<Tuple, Timeline>) {
        let mut tuples = Vec::new();
        self.pull_into(&mut tuples);
        collector.extend(
            tuples
                .into_iter()
                .map(|tuple| (tuple, Timeline::starting_at(Timestamp::ZERO))),
        );
    }

    fn as_resumable(&self) -> Option<&dyn ResumableNode> {
        None
    }

    fn as_resumable_mut(&mut self) -> Option<&mut dyn ResumableNode> {
        None
    }
}

/// A node that defers part of its work to later timestamps.
pub trait ResumableNode {
    /// Smallest timestamp with deferred work, if any.
    fn resumable_timestamp(&self) -> Option<Timestamp>;

    /// Performs the work deferred to `timestamp`.
    ///
    /// # Panics
    ///
    /// Panics if `timestamp` is not the resumable timestamp.
    fn resume_at(&mut self, timestamp: Timestamp, outbox: &mut Outbox);
}
