// Copyright © 2024 Pathway

use std::collections::BTreeMap;

use indexmap::map::Entry;
use indexmap::IndexMap;
use log::trace;

use crate::engine::communication::{MailboxId, MessageSelector};
use crate::engine::{Direction, Timestamp, Tuple};

/// What the scheduler must learn about a mailbox after a message was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSignal {
    /// The mailbox got its first message at the timestamp.
    HasMessage(Timestamp),
    /// The messages at the timestamp cancelled out.
    LostAllMessages(Timestamp),
}

pub trait Mailbox {
    fn receiver(&self) -> MailboxId;

    fn post_message(
        &mut self,
        direction: Direction,
        tuple: Tuple,
        timestamp: Timestamp,
    ) -> Option<MailboxSignal>;

    /// Removes and returns the messages selected by `selector` as tuples with their
    /// multiplicities.
    fn deliver_all(&mut self, selector: MessageSelector) -> Vec<(Tuple, isize)>;

    fn is_empty(&self) -> bool;

    fn clear(&mut self);
}

/// Mailbox keeping messages by timestamp. Opposite messages of the same tuple at the same
/// timestamp cancel out.
#[derive(Debug, Clone)]
pub struct TimelyMailbox {
    receiver: MailboxId,
    queue: BTreeMap<Timestamp, IndexMap<Tuple, isize>>,
}

impl TimelyMailbox {
    pub fn new(receiver: MailboxId) -> Self {
        Self {
            receiver,
            queue: BTreeMap::new(),
        }
    }

    /// Timestamps with pending messages, in increasing order.
    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.queue.keys().copied()
    }
}

impl Mailbox for TimelyMailbox {
    fn receiver(&self) -> MailboxId {
        self.receiver
    }

    fn post_message(
        &mut self,
        direction: Direction,
        tuple: Tuple,
        timestamp: Timestamp,
    ) -> Option<MailboxSignal> {
        let was_empty = !self.queue.contains_key(&timestamp);
        let tuples = self.queue.entry(timestamp).or_default();
        match tuples.entry(tuple) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() += direction.sign();
                if *entry.get() == 0 {
                    entry.shift_remove();
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(direction.sign());
            }
        }
        let now_empty = tuples.is_empty();
        if now_empty {
            self.queue.remove(&timestamp);
        }

        if was_empty && !now_empty {
            Some(MailboxSignal::HasMessage(timestamp))
        } else if !was_empty && now_empty {
            trace!("messages of {:?} at {timestamp} cancelled out", self.receiver);
            Some(MailboxSignal::LostAllMessages(timestamp))
        } else {
            None
        }
    }

    fn deliver_all(&mut self, selector: MessageSelector) -> Vec<(Tuple, isize)> {
        let MessageSelector::Timestamp(timestamp) = selector else {
            panic!("unsupported message selector {selector}");
        };
        self.queue
            .remove(&timestamp)
            .map(|tuples| tuples.into_iter().collect())
            .unwrap_or_default()
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}
