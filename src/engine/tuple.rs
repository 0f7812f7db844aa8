// Copyright © 2024 Pathway

use std::fmt::{self, Display};
use std::ops::Deref;

use arcstr::ArcStr;
use itertools::Itertools as _;
use ordered_float::OrderedFloat;
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(ArcStr),
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::None => write!(fmt, "None"),
            Self::Bool(b) => write!(fmt, "{}", if *b { "True" } else { "False" }),
            Self::Int(i) => write!(fmt, "{i}"),
            Self::Float(OrderedFloat(f)) => write!(fmt, "{f:?}"),
            Self::String(s) => write!(fmt, "{s:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(OrderedFloat(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<ArcStr> for Value {
    fn from(s: ArcStr) -> Self {
        Self::String(s)
    }
}

/// Immutable row flowing between dataflow nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tuple(SmallVec<[Value; 4]>);

impl Tuple {
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    /// Concatenates `self` with the columns of `other` that `mask` does not pick.
    #[must_use]
    pub fn join_with(&self, other: &Tuple, mask: &TupleMask) -> Self {
        let mut values = self.0.clone();
        values.extend(
            other
                .0
                .iter()
                .enumerate()
                .filter(|(index, _)| !mask.indices.contains(index))
                .map(|(_, value)| value.clone()),
        );
        Self(values)
    }
}

impl Deref for Tuple {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self(SmallVec::from_vec(values))
    }
}

impl<const N: usize> From<[Value; N]> for Tuple {
    fn from(values: [Value; N]) -> Self {
        values.into_iter().collect()
    }
}

impl Display for Tuple {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "({})", self.0.iter().format(", "))
    }
}

/// Selects and reorders columns of a tuple of a fixed width.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TupleMask {
    indices: SmallVec<[usize; 4]>,
    source_width: usize,
}

impl TupleMask {
    pub fn new(indices: impl IntoIterator<Item = usize>, source_width: usize) -> Self {
        let indices: SmallVec<_> = indices.into_iter().collect();
        assert!(
            indices.iter().all(|index| *index < source_width),
            "mask indices {indices:?} out of bounds for width {source_width}"
        );
        Self {
            indices,
            source_width,
        }
    }

    pub fn identity(width: usize) -> Self {
        Self::new(0..width, width)
    }

    /// Mask that projects every tuple to the empty tuple.
    pub fn omit_all(width: usize) -> Self {
        Self::new([], width)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn source_width(&self) -> usize {
        self.source_width
    }

    pub fn is_identity(&self) -> bool {
        self.indices.len() == self.source_width
            && self.indices.iter().enumerate().all(|(i, index)| i == *index)
    }

    pub fn project(&self, tuple: &Tuple) -> Tuple {
        self.indices
            .iter()
            .map(|index| tuple[*index].clone())
            .collect()
    }
}
