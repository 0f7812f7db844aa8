// Copyright © 2024 Pathway

//! Multisets of tuples that remember when each tuple was present.

mod masked;
mod timely;

pub use self::masked::{
    DefaultMaskedMemory, MaskedMemory, MemoryKey, NullaryMaskedMemory, TimelyMaskedMemory,
    UnaryMaskedMemory,
};
pub use self::timely::TimelyMemory;
