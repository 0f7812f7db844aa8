// Copyright © 2024 Pathway

use super::MailboxId;
use crate::engine::{Timestamp, TimestampTransformation};

/// How messages from one sender reach a mailbox.
///
/// A proxy always points at a plain mailbox, so proxies never nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proxy {
    Direct(MailboxId),
    Transformed {
        mailbox: MailboxId,
        transformation: TimestampTransformation,
    },
}

impl Proxy {
    pub fn new(mailbox: MailboxId, transformation: Option<TimestampTransformation>) -> Self {
        match transformation {
            Some(transformation) => Self::Transformed {
                mailbox,
                transformation,
            },
            None => Self::Direct(mailbox),
        }
    }

    pub fn mailbox(&self) -> MailboxId {
        match self {
            Self::Direct(mailbox) | Self::Transformed { mailbox, .. } => *mailbox,
        }
    }

    pub fn transformation(&self) -> Option<TimestampTransformation> {
        match self {
            Self::Direct(_) => None,
            Self::Transformed { transformation, .. } => Some(*transformation),
        }
    }

    pub fn apply(&self, timestamp: Timestamp) -> Timestamp {
        match self {
            Self::Direct(_) => timestamp,
            Self::Transformed { transformation, .. } => transformation.apply(timestamp),
        }
    }
}
