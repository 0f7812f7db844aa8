// Copyright © 2024 Pathway

macro_rules! define_handle {
    ($handle:ident) => {
        #[derive(Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Debug)]
        pub struct $handle {
            arena_id: u32,
            index: u32,
        }

        impl id_arena::ArenaBehavior for $handle {
            type Id = Self;

            fn new_id(arena_id: u32, index: usize) -> Self {
                let index = index.try_into().unwrap();
                Self { arena_id, index }
            }

            fn arena_id(handle: Self) -> u32 {
                handle.arena_id
            }

            fn index(handle: Self) -> usize {
                handle.index.try_into().unwrap()
            }
        }
    };
}

pub mod communication;
pub mod config;
pub mod error;
pub mod itc;
pub mod memory;
pub mod network;
pub mod timeline;
pub mod timestamp;
pub mod tuple;

pub use self::config::{TimelineRepresentation, TimelyConfiguration};
pub use self::error::{Error, Result};
pub use self::network::{Network, NodeId};
pub use self::timeline::{Diff, Direction, Signed, Timeline};
pub use self::timestamp::{Timestamp, TimestampTransformation};
pub use self::tuple::{Tuple, TupleMask, Value};
