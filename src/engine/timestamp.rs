// Copyright © 2024 Pathway

use std::fmt::{self, Display};
use std::str::FromStr;

/// Logical time of a message inside the dataflow network.
///
/// Timestamps start at [`Timestamp::ZERO`] for external input and only grow when a message
/// travels along a feedback edge of a recursive group.
#[derive(Debug, Clone, Copy, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Timestamp {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Rewrites the timestamp of a message crossing a group boundary or a feedback edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampTransformation {
    /// Leaving a recursive group: the successor group starts counting from zero.
    Reset,
    /// Entering a production node from inside its own group.
    Increment,
}

impl TimestampTransformation {
    pub fn apply(self, timestamp: Timestamp) -> Timestamp {
        match self {
            Self::Reset => Timestamp::ZERO,
            Self::Increment => timestamp.next(),
        }
    }
}

impl Display for TimestampTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "RESET"),
            Self::Increment => write!(f, "INCREMENT"),
        }
    }
}
