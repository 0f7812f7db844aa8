// Copyright © 2024 Pathway

use std::fmt::{self, Display};

use itertools::{EitherOrBoth, Itertools as _};
use smallvec::SmallVec;

use super::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Insert,
    Delete,
}

impl Direction {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Insert => Self::Delete,
            Self::Delete => Self::Insert,
        }
    }

    /// Direction of the product of two signed changes.
    #[must_use]
    pub fn multiply(self, other: Self) -> Self {
        if self == other {
            Self::Insert
        } else {
            Self::Delete
        }
    }

    pub fn sign(self) -> isize {
        match self {
            Self::Insert => 1,
            Self::Delete => -1,
        }
    }

    pub fn from_sign(sign: isize) -> Option<Self> {
        match sign.signum() {
            1 => Some(Self::Insert),
            -1 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "+"),
            Self::Delete => write!(f, "-"),
        }
    }
}

/// A change of presence at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signed {
    pub direction: Direction,
    pub timestamp: Timestamp,
}

impl Signed {
    pub fn new(direction: Direction, timestamp: Timestamp) -> Self {
        Self {
            direction,
            timestamp,
        }
    }
}

impl Display for Signed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.direction, self.timestamp)
    }
}

/// Changes of a timeline, ordered by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff(SmallVec<[Signed; 2]>);

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, direction: Direction, timestamp: Timestamp) {
        debug_assert!(self.0.last().is_none_or(|last| last.timestamp < timestamp));
        self.0.push(Signed::new(direction, timestamp));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signed> + '_ {
        self.0.iter()
    }
}

impl IntoIterator for Diff {
    type Item = Signed;
    type IntoIter = smallvec::IntoIter<[Signed; 2]>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a Signed;
    type IntoIter = std::slice::Iter<'a, Signed>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Signed> for Diff {
    fn from_iter<I: IntoIterator<Item = Signed>>(iter: I) -> Self {
        let mut diff = Self::new();
        for signed in iter {
            diff.push(signed.direction, signed.timestamp);
        }
        diff
    }
}

/// Presence of a tuple over logical time.
///
/// Stored as strictly increasing moments that alternate between insertion and deletion,
/// starting with an insertion. A timeline of odd length stays present forever.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Timeline(SmallVec<[Timestamp; 2]>);

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeline present from `timestamp` onwards.
    pub fn starting_at(timestamp: Timestamp) -> Self {
        Self(SmallVec::from_slice(&[timestamp]))
    }

    pub fn from_diff(diff: &Diff) -> Self {
        Self::new().merge_additive(diff)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_present_at_infinity(&self) -> bool {
        self.0.len() % 2 == 1
    }

    pub fn is_present_at(&self, timestamp: Timestamp) -> bool {
        self.0.partition_point(|moment| *moment <= timestamp) % 2 == 1
    }

    pub fn first_insertion(&self) -> Option<Timestamp> {
        self.0.first().copied()
    }

    pub fn as_change_sequence(&self) -> impl Iterator<Item = Signed> + '_ {
        self.0.iter().enumerate().map(|(index, timestamp)| {
            let direction = if index % 2 == 0 {
                Direction::Insert
            } else {
                Direction::Delete
            };
            Signed::new(direction, *timestamp)
        })
    }

    /// Applies `diff` on top of this timeline. Opposite changes at the same moment cancel out.
    ///
    /// # Panics
    ///
    /// Panics if the result would not alternate between insertions and deletions starting
    /// with an insertion, or if two changes at the same moment have the same direction.
    #[must_use]
    pub fn merge_additive(&self, diff: &Diff) -> Self {
        let mut result = SmallVec::new();
        let mut expected = Direction::Insert;
        let merged = self
            .as_change_sequence()
            .merge_join_by(diff.iter().copied(), |ours, theirs| {
                ours.timestamp.cmp(&theirs.timestamp)
            });
        for change in merged {
            match change {
                EitherOrBoth::Left(signed) | EitherOrBoth::Right(signed) => {
                    assert_eq!(
                        expected, signed.direction,
                        "expected direction {expected} violated at {} while merging {diff:?} into {self}",
                        signed.timestamp
                    );
                    result.push(signed.timestamp);
                    expected = expected.opposite();
                }
                EitherOrBoth::Both(ours, theirs) => {
                    assert_ne!(
                        ours.direction, theirs.direction,
                        "changes do not cancel out at {} while merging {diff:?} into {self}",
                        ours.timestamp
                    );
                }
            }
        }
        Self(result)
    }

    /// Intersection of two timelines: present exactly when both inputs are present.
    #[must_use]
    pub fn merge_multiplicative(&self, other: &Timeline) -> Self {
        let mut result = SmallVec::new();
        let mut ours_seen = 0;
        let mut theirs_seen = 0;
        let merged = self
            .0
            .iter()
            .merge_join_by(other.0.iter(), |ours, theirs| ours.cmp(theirs));
        for change in merged {
            match change {
                EitherOrBoth::Left(timestamp) => {
                    if theirs_seen % 2 == 1 {
                        result.push(*timestamp);
                    }
                    ours_seen += 1;
                }
                EitherOrBoth::Right(timestamp) => {
                    if ours_seen % 2 == 1 {
                        result.push(*timestamp);
                    }
                    theirs_seen += 1;
                }
                EitherOrBoth::Both(timestamp, _) => {
                    if ours_seen % 2 == theirs_seen % 2 {
                        result.push(*timestamp);
                    }
                    ours_seen += 1;
                    theirs_seen += 1;
                }
            }
        }
        Self(result)
    }
}

impl Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.as_change_sequence().format(", "))
    }
}
