// Copyright © 2024 Pathway

use std::result;

use super::NodeId;
use crate::env::Error as EnvError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid node handle")]
    InvalidNodeHandle,

    #[error("node {0:?} does not accept external input")]
    NotAnInput(NodeId),

    #[error("node {node:?} has no input port {port}")]
    InvalidPort { node: NodeId, port: usize },

    #[error("unknown timeline representation {0:?}, expected \"first_only\" or \"faithful\"")]
    UnknownTimelineRepresentation(String),

    #[error(transparent)]
    Env(#[from] EnvError),
}

pub type Result<T, E = Error> = result::Result<T, E>;
