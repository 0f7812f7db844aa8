// Copyright © 2024 Pathway

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{self, Display};

use super::MailboxId;
use crate::engine::{NodeId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub(super) usize);

impl Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single node, or a strongly connected component of the dependency graph.
///
/// Pending mailboxes are kept by timestamp. Within one timestamp they are ordered by the rank
/// of their receiver and then by mailbox id. Ranks are all zero unless the group was
/// ranked, see [`CommunicationGroup::set_ranks_and_reorder`].
#[derive(Debug, Clone)]
pub struct CommunicationGroup {
    id: GroupId,
    representative: NodeId,
    pub(super) identifier: i64,
    pub(super) recursive: bool,
    ranks: HashMap<NodeId, usize>,
    mailbox_queue: BTreeMap<Timestamp, BTreeSet<(usize, MailboxId)>>,
    pub(super) is_enqueued: bool,
    pub(super) currently_delivering: bool,
    currently_delivered: Option<Timestamp>,
}

impl CommunicationGroup {
    pub(super) fn new(id: GroupId, representative: NodeId, identifier: i64, recursive: bool) -> Self {
        Self {
            id,
            representative,
            identifier,
            recursive,
            ranks: HashMap::new(),
            mailbox_queue: BTreeMap::new(),
            is_enqueued: false,
            currently_delivering: false,
            currently_delivered: None,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn representative(&self) -> NodeId {
        self.representative
    }

    /// Position of the group in the topological order of groups.
    pub fn identifier(&self) -> i64 {
        self.identifier
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn is_enqueued(&self) -> bool {
        self.is_enqueued
    }

    pub fn is_delivering(&self) -> bool {
        self.currently_delivering
    }

    /// Timestamp of the mailbox being delivered, if any.
    pub fn currently_delivered(&self) -> Option<Timestamp> {
        self.currently_delivered
    }

    pub fn is_empty(&self) -> bool {
        self.mailbox_queue.is_empty()
    }

    pub fn rank(&self, node: NodeId) -> usize {
        self.ranks.get(&node).copied().unwrap_or(0)
    }

    /// Pending mailboxes in delivery order.
    pub fn mailboxes(&self) -> impl Iterator<Item = (Timestamp, MailboxId)> + '_ {
        self.mailbox_queue.iter().flat_map(|(timestamp, bucket)| {
            bucket.iter().map(|(_rank, mailbox)| (*timestamp, *mailbox))
        })
    }

    pub(super) fn enqueue(&mut self, mailbox: MailboxId, timestamp: Timestamp) {
        let rank = self.rank(mailbox.node);
        self.mailbox_queue
            .entry(timestamp)
            .or_default()
            .insert((rank, mailbox));
    }

    pub(super) fn dequeue(&mut self, mailbox: MailboxId, timestamp: Timestamp) {
        let rank = self.rank(mailbox.node);
        let Some(bucket) = self.mailbox_queue.get_mut(&timestamp) else {
            panic!("no mailboxes registered at timestamp {timestamp} in group {}", self.id);
        };
        assert!(
            bucket.remove(&(rank, mailbox)),
            "mailbox {mailbox:?} was not registered at timestamp {timestamp} in group {}",
            self.id
        );
        if bucket.is_empty() {
            self.mailbox_queue.remove(&timestamp);
        }
    }

    /// Removes the first mailbox of the smallest timestamp.
    pub(super) fn pop_next(&mut self) -> Option<(MailboxId, Timestamp)> {
        let mut entry = self.mailbox_queue.first_entry()?;
        let timestamp = *entry.key();
        let next = entry.get_mut().pop_first();
        if entry.get().is_empty() {
            entry.remove();
        }
        let (_rank, mailbox) = next?;
        self.currently_delivered = Some(timestamp);
        Some((mailbox, timestamp))
    }

    pub(super) fn finish_delivery(&mut self) {
        self.currently_delivering = false;
        self.currently_delivered = None;
    }

    pub(super) fn clear(&mut self) {
        self.mailbox_queue.clear();
        self.finish_delivery();
    }

    /// Replaces the ranks of the members and reorders the pending mailboxes accordingly.
    pub fn set_ranks_and_reorder(&mut self, ranks: HashMap<NodeId, usize>) {
        self.ranks = ranks;
        let queue = std::mem::take(&mut self.mailbox_queue);
        for (timestamp, bucket) in queue {
            for (_rank, mailbox) in bucket {
                self.enqueue(mailbox, timestamp);
            }
        }
    }
}
