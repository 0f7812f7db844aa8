// Copyright © 2024 Pathway

//! Ordering of message delivery between the nodes of a network.
//!
//! Nodes are grouped by the strongly connected components of their dependency graph. Groups
//! are delivered in topological order and, inside a group, mailboxes are delivered in
//! increasing order of timestamps.

use std::fmt::{self, Display};

use crate::engine::{NodeId, Timestamp};

mod group;
mod proxy;
mod tracker;

pub use self::group::{CommunicationGroup, GroupId};
pub use self::proxy::Proxy;
pub use self::tracker::CommunicationTracker;

/// Which messages of a mailbox are meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSelector {
    Timestamp(Timestamp),
    /// Selector of schedulers without logical time. Timely groups reject it.
    Timeless,
}

impl From<Timestamp> for MessageSelector {
    fn from(timestamp: Timestamp) -> Self {
        Self::Timestamp(timestamp)
    }
}

impl Display for MessageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(timestamp) => write!(f, "{timestamp}"),
            Self::Timeless => write!(f, "timeless"),
        }
    }
}

/// The mailbox of one input port of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MailboxId {
    pub node: NodeId,
    pub port: usize,
}

impl MailboxId {
    pub fn new(node: NodeId, port: usize) -> Self {
        Self { node, port }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeTraits {
    /// Production nodes hold the results of a (possibly recursive) computation. Messages
    /// reaching them from inside their own group move one timestamp forward.
    pub production: bool,
    /// Groupable nodes receive messages through mailboxes. Network inputs are not groupable.
    pub groupable: bool,
}

impl NodeTraits {
    pub fn input() -> Self {
        Self {
            production: false,
            groupable: false,
        }
    }

    pub fn standard() -> Self {
        Self {
            production: false,
            groupable: true,
        }
    }

    pub fn production() -> Self {
        Self {
            production: true,
            groupable: true,
        }
    }
}
