// Copyright © 2024 Pathway

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use indexmap::{IndexMap, IndexSet};
use log::trace;

use crate::engine::{Diff, Direction, Timeline, Timestamp, Tuple};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CumulativeCounter {
    /// Net number of insertions recorded exactly at this timestamp.
    diff: isize,
    /// Multiplicity of the tuple from this timestamp on.
    cumulative: isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignChange {
    BecamePositive,
    BecameZero,
    Irrelevant,
}

/// A multiset of tuples with a presence timeline per tuple.
///
/// Every put/remove is recorded at a timestamp. In eager mode the presence diff
/// caused by the change is computed right away. In lazy mode the change is only
/// recorded and its effect is folded in later through [`TimelyMemory::resume_at`],
/// one timestamp at a time.
#[derive(Debug, Clone, Default)]
pub struct TimelyMemory {
    lazy: bool,
    counters: HashMap<Tuple, BTreeMap<Timestamp, CumulativeCounter>>,
    timelines: IndexMap<Tuple, Timeline>,
    present_at_infinity: IndexSet<Tuple>,
    folding_states: BTreeMap<Timestamp, IndexMap<Tuple, isize>>,
}

impl TimelyMemory {
    pub fn new(lazy: bool) -> Self {
        Self {
            lazy,
            ..Self::default()
        }
    }

    pub fn eager() -> Self {
        Self::new(false)
    }

    pub fn lazy() -> Self {
        Self::new(true)
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Records an insertion of `tuple` at `timestamp`.
    ///
    /// # Panics
    ///
    /// Panics if the insertion cancels a deletion that was never matched by an insertion.
    pub fn put(&mut self, tuple: &Tuple, timestamp: Timestamp) -> Diff {
        self.update(tuple, timestamp, Direction::Insert)
    }

    /// Records a deletion of `tuple` at `timestamp`.
    ///
    /// # Panics
    ///
    /// Panics on duplicate deletion, i.e. when the multiplicity would become negative.
    pub fn remove(&mut self, tuple: &Tuple, timestamp: Timestamp) -> Diff {
        self.update(tuple, timestamp, Direction::Delete)
    }

    fn update(&mut self, tuple: &Tuple, timestamp: Timestamp, direction: Direction) -> Diff {
        if self.lazy {
            self.counter_mut(tuple, timestamp).diff += direction.sign();
            self.add_folding_state(tuple, direction.sign(), timestamp);
            Diff::new()
        } else {
            self.update_eager(tuple, timestamp, direction)
        }
    }

    fn update_eager(&mut self, tuple: &Tuple, timestamp: Timestamp, direction: Direction) -> Diff {
        let sign = direction.sign();
        self.counter_mut(tuple, timestamp).diff += sign;

        let mut diff = Diff::new();
        let mut previous = SignChange::Irrelevant;
        let counters = self.counters.entry(tuple.clone()).or_default();
        for (moment, counter) in counters.range_mut(timestamp..) {
            counter.cumulative += sign;
            previous = sign_change_eager(tuple, direction, *counter, *moment, previous, &mut diff);
        }

        self.collect_counter(tuple, timestamp);
        self.update_timeline(tuple, &diff);
        diff
    }

    /// Earliest timestamp with deferred folding work, if any.
    pub fn resumable_timestamp(&self) -> Option<Timestamp> {
        self.folding_states.keys().next().copied()
    }

    /// Tuples with deferred folding work at the resumable timestamp.
    pub fn resumable_tuples(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.folding_states
            .values()
            .next()
            .into_iter()
            .flat_map(IndexMap::keys)
    }

    /// Folds all deferred changes recorded at `timestamp`, returning the presence diffs
    /// of the affected tuples. Tuples whose presence does not change are left out.
    ///
    /// Work pending at earlier timestamps must be net zero and is discarded.
    ///
    /// # Panics
    ///
    /// Panics if `timestamp` is not the resumable timestamp (after discarding net-zero
    /// work), or if folding at `timestamp` schedules more work at the same timestamp.
    pub fn resume_at(&mut self, timestamp: Timestamp) -> IndexMap<Tuple, Diff> {
        let Some(mut current) = self.resumable_timestamp() else {
            panic!("resume_at({timestamp}) called on a memory with nothing to fold");
        };
        while current < timestamp {
            let states = self.folding_states.remove(&current).unwrap_or_default();
            for (tuple, state) in states {
                assert_eq!(
                    state, 0,
                    "folding state of {tuple} at {current} is not empty while resuming at {timestamp}"
                );
                self.fold_step(&tuple, 0, current);
            }
            trace!("discarded empty folding states at {current}");
            match self.resumable_timestamp() {
                Some(next) => current = next,
                None => panic!("resume_at({timestamp}) called but no folding work remains"),
            }
        }
        assert_eq!(
            current, timestamp,
            "resume_at({timestamp}) called but the memory resumes at {current}"
        );

        let states = self.folding_states.remove(&timestamp).unwrap_or_default();
        let mut result = IndexMap::new();
        for (tuple, state) in states {
            let diff = self.fold_step(&tuple, state, timestamp);
            if !diff.is_empty() {
                result.insert(tuple, diff);
            }
        }
        assert!(
            !self.folding_states.contains_key(&timestamp),
            "folding at {timestamp} scheduled more work at the same timestamp"
        );
        result
    }

    fn fold_step(&mut self, tuple: &Tuple, state: isize, timestamp: Timestamp) -> Diff {
        self.counter_mut(tuple, timestamp);
        if state == 0 {
            self.collect_counter(tuple, timestamp);
            return Diff::new();
        }

        let counters = self.counters.entry(tuple.clone()).or_default();
        let next = counters
            .range((Excluded(timestamp), Unbounded))
            .next()
            .map(|(moment, _)| *moment);
        let counter = counters.entry(timestamp).or_default();
        let old = counter.cumulative;
        counter.cumulative += state;
        let new = counter.cumulative;

        let diff = plateau_diff(tuple, old, new, timestamp, next);
        self.collect_counter(tuple, timestamp);
        self.update_timeline(tuple, &diff);
        if let Some(next) = next {
            self.add_folding_state(tuple, state, next);
        }
        diff
    }

    fn add_folding_state(&mut self, tuple: &Tuple, state: isize, timestamp: Timestamp) {
        *self
            .folding_states
            .entry(timestamp)
            .or_default()
            .entry(tuple.clone())
            .or_default() += state;
    }

    fn counter_mut(&mut self, tuple: &Tuple, timestamp: Timestamp) -> &mut CumulativeCounter {
        let counters = self.counters.entry(tuple.clone()).or_default();
        let previous = counters
            .range(..timestamp)
            .next_back()
            .map_or(0, |(_, counter)| counter.cumulative);
        counters.entry(timestamp).or_insert(CumulativeCounter {
            diff: 0,
            cumulative: previous,
        })
    }

    fn collect_counter(&mut self, tuple: &Tuple, timestamp: Timestamp) {
        let Some(counters) = self.counters.get_mut(tuple) else {
            return;
        };
        if counters.get(&timestamp).is_some_and(|counter| counter.diff == 0) {
            counters.remove(&timestamp);
        }
        if counters.is_empty() {
            self.counters.remove(tuple);
        }
    }

    fn update_timeline(&mut self, tuple: &Tuple, diff: &Diff) {
        if diff.is_empty() {
            return;
        }
        let timeline = match self.timelines.get(tuple) {
            Some(timeline) => timeline.merge_additive(diff),
            None => Timeline::from_diff(diff),
        };
        if timeline.is_present_at_infinity() {
            self.present_at_infinity.insert(tuple.clone());
        } else {
            self.present_at_infinity.shift_remove(tuple);
        }
        if timeline.is_empty() {
            self.timelines.shift_remove(tuple);
        } else {
            self.timelines.insert(tuple.clone(), timeline);
        }
    }

    pub fn timeline(&self, tuple: &Tuple) -> Option<&Timeline> {
        self.timelines.get(tuple)
    }

    pub fn timelines(&self) -> &IndexMap<Tuple, Timeline> {
        &self.timelines
    }

    pub fn is_present_at_infinity(&self, tuple: &Tuple) -> bool {
        self.present_at_infinity.contains(tuple)
    }

    pub fn tuples_at_infinity(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.present_at_infinity.iter()
    }

    pub fn count_at_infinity(&self) -> usize {
        self.present_at_infinity.len()
    }

    /// Multiplicity of `tuple` after all recorded changes, folded or not.
    pub fn multiplicity(&self, tuple: &Tuple) -> isize {
        self.counters
            .get(tuple)
            .map_or(0, |counters| counters.values().map(|counter| counter.diff).sum())
    }

    /// Tuples with at least one recorded change that has not cancelled out.
    pub fn keys(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.counters.keys()
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.counters.contains_key(tuple)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.folding_states.is_empty()
    }

    pub fn clear(&mut self) {
        self.counters.clear();
        self.timelines.clear();
        self.present_at_infinity.clear();
        self.folding_states.clear();
    }
}

fn sign_change_eager(
    tuple: &Tuple,
    direction: Direction,
    counter: CumulativeCounter,
    timestamp: Timestamp,
    previous: SignChange,
    diff: &mut Diff,
) -> SignChange {
    let (became, threshold) = match direction {
        Direction::Insert => (SignChange::BecamePositive, 1),
        Direction::Delete => (SignChange::BecameZero, 0),
    };
    assert!(
        counter.cumulative >= 0 && (direction == Direction::Delete || counter.cumulative > 0),
        "duplicate deletion of {tuple}: count at {timestamp} would be negative"
    );
    if counter.cumulative == threshold {
        assert_ne!(
            previous, became,
            "presence of {tuple} changed twice in a row at {timestamp} with zero diff {}",
            counter.diff
        );
        diff.push(direction, timestamp);
        became
    } else {
        if previous == became {
            diff.push(direction.opposite(), timestamp);
        }
        SignChange::Irrelevant
    }
}

/// Change of presence when the multiplicity goes from `old` to `new` on the plateau
/// `[timestamp, next)`.
fn plateau_diff(
    tuple: &Tuple,
    old: isize,
    new: isize,
    timestamp: Timestamp,
    next: Option<Timestamp>,
) -> Diff {
    assert!(new >= 0, "duplicate deletion of {tuple} at {timestamp}");
    let mut diff = Diff::new();
    let direction = match (old > 0, new > 0) {
        (false, true) => Direction::Insert,
        (true, false) => Direction::Delete,
        _ => return diff,
    };
    diff.push(direction, timestamp);
    if let Some(next) = next {
        diff.push(direction.opposite(), next);
    }
    diff
}
