// Copyright © 2024 Pathway

use indexmap::IndexMap;
use log::warn;

use super::node::{Node, Outbox, ResumableNode};
use crate::engine::communication::NodeTraits;
use crate::engine::memory::{MaskedMemory, TimelyMemory};
use crate::engine::{Direction, Timeline, TimelyConfiguration, Timestamp, Tuple, TupleMask};

fn update_counts(counts: &mut IndexMap<Tuple, isize>, tuple: &Tuple, count: isize) {
    let entry = counts.entry(tuple.clone()).or_insert(0);
    *entry += count;
    assert!(*entry >= 0, "duplicate deletion of {tuple}");
    if *entry == 0 {
        counts.shift_remove(tuple);
    }
}

fn units(updates: &[(Tuple, isize)]) -> impl Iterator<Item = (Direction, &Tuple)> + '_ {
    updates.iter().flat_map(|(tuple, count)| {
        let direction = Direction::from_sign(*count);
        direction
            .into_iter()
            .flat_map(move |direction| (0..count.unsigned_abs()).map(move |_| (direction, tuple)))
    })
}

/// Entry point of external changes. All of them arrive at timestamp zero.
#[derive(Debug, Default)]
pub struct InputNode {
    contents: IndexMap<Tuple, isize>,
}

impl InputNode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Node for InputNode {
    fn traits(&self) -> NodeTraits {
        NodeTraits::input()
    }

    fn input_ports(&self) -> usize {
        0
    }

    fn batch_update(
        &mut self,
        _port: usize,
        updates: &[(Tuple, isize)],
        timestamp: Timestamp,
        outbox: &mut Outbox,
    ) {
        for (tuple, count) in updates {
            update_counts(&mut self.contents, tuple, *count);
            outbox.send_count(tuple, *count, timestamp);
        }
    }

    fn pull_into(&self, collector: &mut Vec<Tuple>) {
        collector.extend(self.contents.keys().cloned());
    }
}

/// Keeps the columns selected by a mask.
#[derive(Debug)]
pub struct ProjectionNode {
    mask: TupleMask,
    contents: IndexMap<Tuple, isize>,
}

impl ProjectionNode {
    pub fn new(mask: TupleMask) -> Self {
        Self {
            mask,
            contents: IndexMap::new(),
        }
    }
}

impl Node for ProjectionNode {
    fn traits(&self) -> NodeTraits {
        NodeTraits::standard()
    }

    fn input_ports(&self) -> usize {
        1
    }

    fn batch_update(
        &mut self,
        _port: usize,
        updates: &[(Tuple, isize)],
        timestamp: Timestamp,
        outbox: &mut Outbox,
    ) {
        for (tuple, count) in updates {
            let projected = if self.mask.is_identity() {
                tuple.clone()
            } else {
                self.mask.project(tuple)
            };
            update_counts(&mut self.contents, &projected, *count);
            outbox.send_count(&projected, *count, timestamp);
        }
    }

    fn pull_into(&self, collector: &mut Vec<Tuple>) {
        collector.extend(self.contents.keys().cloned());
    }
}

/// Natural join of two sets of tuples.
///
/// Port 0 is the primary side and port 1 the secondary side. Tuples match when their
/// projections through the masks of their sides are equal. A joined tuple consists of the
/// primary tuple followed by the secondary columns not in the secondary mask, and it is
/// present exactly when both of its parts are present.
#[derive(Debug)]
pub struct JoinNode {
    primary: MaskedMemory,
    secondary: MaskedMemory,
    secondary_mask: TupleMask,
}

impl JoinNode {
    pub const PRIMARY: usize = 0;
    pub const SECONDARY: usize = 1;

    pub fn new(primary_mask: TupleMask, secondary_mask: TupleMask) -> Self {
        assert_eq!(
            primary_mask.len(),
            secondary_mask.len(),
            "join masks must select the same number of columns"
        );
        Self {
            primary: MaskedMemory::new(primary_mask, false),
            secondary: MaskedMemory::new(secondary_mask.clone(), false),
            secondary_mask,
        }
    }

    fn update(
        &mut self,
        port: usize,
        direction: Direction,
        tuple: &Tuple,
        timestamp: Timestamp,
        outbox: &mut Outbox,
    ) {
        let (own, opposite) = match port {
            Self::PRIMARY => (&mut self.primary, &self.secondary),
            Self::SECONDARY => (&mut self.secondary, &self.primary),
            _ => panic!("join has no input port {port}"),
        };
        let diff = own.update_with_timestamp(direction, tuple, timestamp);
        if diff.is_empty() {
            return;
        }
        let signature = own.mask().project(tuple);
        let Some(opposites) = opposite.get_with_timeline(&signature) else {
            return;
        };
        for (other, timeline) in opposites {
            let joined = if port == Self::PRIMARY {
                tuple.join_with(other, &self.secondary_mask)
            } else {
                other.join_with(tuple, &self.secondary_mask)
            };
            for signed in &diff {
                for change in timeline.as_change_sequence() {
                    outbox.send(
                        signed.direction.multiply(change.direction),
                        joined.clone(),
                        signed.timestamp.max(change.timestamp),
                    );
                }
            }
        }
    }

    fn joined_timelines(&self) -> impl Iterator<Item = (Tuple, Timeline)> + '_ {
        self.primary.signatures().into_iter().flat_map(move |signature| {
            let primaries = self.primary.get_with_timeline(&signature);
            let secondaries = self.secondary.get_with_timeline(&signature);
            primaries
                .into_iter()
                .flatten()
                .flat_map(move |(left, left_timeline)| {
                    secondaries
                        .into_iter()
                        .flatten()
                        .map(move |(right, right_timeline)| {
                            (
                                left.join_with(right, &self.secondary_mask),
                                left_timeline.merge_multiplicative(right_timeline),
                            )
                        })
                })
        })
    }
}

impl Node for JoinNode {
    fn traits(&self) -> NodeTraits {
        NodeTraits::standard()
    }

    fn input_ports(&self) -> usize {
        2
    }

    fn batch_update(
        &mut self,
        port: usize,
        updates: &[(Tuple, isize)],
        timestamp: Timestamp,
        outbox: &mut Outbox,
    ) {
        for (direction, tuple) in units(updates) {
            self.update(port, direction, tuple, timestamp, outbox);
        }
    }

    fn pull_into(&self, collector: &mut Vec<Tuple>) {
        collector.extend(
            self.joined_timelines()
                .filter(|(_, timeline)| timeline.is_present_at_infinity())
                .map(|(tuple, _)| tuple),
        );
    }

    fn pull_into_with_timeline(&self, collector: &mut IndexMap<Tuple, Timeline>) {
        collector.extend(
            self.joined_timelines()
                .filter(|(_, timeline)| !timeline.is_empty()),
        );
    }
}

/// Production node turning the multiset it receives into a set.
///
/// With the faithful timeline representation the memory folds lazily and the node resumes
/// the folding timestamp by timestamp.
#[derive(Debug)]
pub struct UniquenessEnforcerNode {
    memory: TimelyMemory,
    ports: usize,
}

impl UniquenessEnforcerNode {
    pub fn new(ports: usize, configuration: &TimelyConfiguration) -> Self {
        if ports == 0 {
            warn!("uniqueness enforcer without input ports never receives anything");
        }
        Self {
            memory: TimelyMemory::new(configuration.is_faithful()),
            ports,
        }
    }

    pub fn memory(&self) -> &TimelyMemory {
        &self.memory
    }

    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.memory.tuples_at_infinity()
    }
}

impl Node for UniquenessEnforcerNode {
    fn traits(&self) -> NodeTraits {
        NodeTraits::production()
    }

    fn input_ports(&self) -> usize {
        self.ports
    }

    fn batch_update(
        &mut self,
        _port: usize,
        updates: &[(Tuple, isize)],
        timestamp: Timestamp,
        outbox: &mut Outbox,
    ) {
        for (direction, tuple) in units(updates) {
            let diff = match direction {
                Direction::Insert => self.memory.put(tuple, timestamp),
                Direction::Delete => self.memory.remove(tuple, timestamp),
            };
            for signed in diff {
                outbox.send(signed.direction, tuple.clone(), signed.timestamp);
            }
        }
    }

    fn pull_into(&self, collector: &mut Vec<Tuple>) {
        collector.extend(self.memory.tuples_at_infinity().cloned());
    }

    fn pull_into_with_timeline(&self, collector: &mut IndexMap<Tuple, Timeline>) {
        collector.extend(
            self.memory
                .timelines()
                .iter()
                .map(|(tuple, timeline)| (tuple.clone(), timeline.clone())),
        );
    }

    fn as_resumable(&self) -> Option<&dyn ResumableNode> {
        Some(self)
    }

    fn as_resumable_mut(&mut self) -> Option<&mut dyn ResumableNode> {
        Some(self)
    }
}

impl ResumableNode for UniquenessEnforcerNode {
    fn resumable_timestamp(&self) -> Option<Timestamp> {
        self.memory.resumable_timestamp()
    }

    fn resume_at(&mut self, timestamp: Timestamp, outbox: &mut Outbox) {
        for (tuple, diff) in self.memory.resume_at(timestamp) {
            for signed in diff {
                outbox.send(signed.direction, tuple.clone(), signed.timestamp);
            }
        }
    }
}
