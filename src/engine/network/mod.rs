// Copyright © 2024 Pathway

//! Nodes connected through mailboxes, and the loop delivering messages between them.

use id_arena::Arena;
use indexmap::IndexMap;
use log::{debug, trace};

use crate::engine::communication::{CommunicationTracker, MailboxId, NodeTraits};
use crate::engine::{Direction, Error, Result, Timeline, TimelyConfiguration, Timestamp, Tuple};

mod mailbox;
mod node;
mod nodes;

pub use self::mailbox::{Mailbox, MailboxSignal, TimelyMailbox};
pub use self::node::{Node, Outbox, ResumableNode};
pub use self::nodes::{InputNode, JoinNode, ProjectionNode, UniquenessEnforcerNode};

define_handle!(NodeId);

/// Mailbox through which resumable nodes are scheduled for their deferred work.
const RESUMPTION_PORT: usize = 0;

struct NodeEntry {
    behavior: Box<dyn Node>,
    traits: NodeTraits,
    mailboxes: Vec<TimelyMailbox>,
    /// Number of connections to each mailbox of the children.
    children: IndexMap<MailboxId, usize>,
}

/// A dataflow network evaluated with logical timestamps.
///
/// External changes enter through input nodes at [`Timestamp::ZERO`]. Messages are held in the
/// mailboxes of their receivers until [`Network::deliver_messages`] runs, which delivers them
/// in the order given by the [`CommunicationTracker`] until no messages are left.
pub struct Network {
    configuration: TimelyConfiguration,
    nodes: Arena<NodeEntry, NodeId>,
    tracker: CommunicationTracker,
}

impl Network {
    pub fn new(configuration: TimelyConfiguration) -> Self {
        Self {
            configuration,
            nodes: Arena::new(),
            tracker: CommunicationTracker::new(configuration),
        }
    }

    pub fn configuration(&self) -> &TimelyConfiguration {
        &self.configuration
    }

    pub fn tracker(&self) -> &CommunicationTracker {
        &self.tracker
    }

    pub fn add_node(&mut self, behavior: impl Node + 'static) -> NodeId {
        let traits = behavior.traits();
        let ports = behavior.input_ports();
        let id = self.nodes.alloc_with_id(|id| NodeEntry {
            behavior: Box::new(behavior),
            traits,
            mailboxes: (0..ports)
                .map(|port| TimelyMailbox::new(MailboxId::new(id, port)))
                .collect(),
            children: IndexMap::new(),
        });
        self.tracker.register_node(id, traits);
        trace!("added node {id:?} with {ports} input ports");
        id
    }

    fn entry(&self, node: NodeId) -> Result<&NodeEntry> {
        self.nodes.get(node).ok_or(Error::InvalidNodeHandle)
    }

    pub fn node(&self, node: NodeId) -> Result<&dyn Node> {
        Ok(self.entry(node)?.behavior.as_ref())
    }

    /// Lets `parent` send its messages to input port `port` of `child`.
    ///
    /// # Panics
    ///
    /// Panics if `child` does not receive messages through mailboxes.
    pub fn connect(&mut self, parent: NodeId, child: NodeId, port: usize) -> Result<()> {
        self.entry(parent)?;
        let child_entry = self.entry(child)?;
        assert!(
            child_entry.traits.groupable,
            "node {child:?} cannot receive messages from other nodes"
        );
        if port >= child_entry.mailboxes.len() {
            return Err(Error::InvalidPort { node: child, port });
        }
        *self.nodes[parent]
            .children
            .entry(MailboxId::new(child, port))
            .or_insert(0) += 1;
        self.tracker.register_dependency(parent, child);
        Ok(())
    }

    /// Removes one connection made by [`Network::connect`]. Returns whether it existed.
    pub fn disconnect(&mut self, parent: NodeId, child: NodeId, port: usize) -> Result<bool> {
        self.entry(child)?;
        let children = &mut self
            .nodes
            .get_mut(parent)
            .ok_or(Error::InvalidNodeHandle)?
            .children;
        let mailbox = MailboxId::new(child, port);
        let Some(count) = children.get_mut(&mailbox) else {
            return Ok(false);
        };
        *count -= 1;
        if *count == 0 {
            children.shift_remove(&mailbox);
        }
        if !children.keys().any(|mailbox| mailbox.node == child) {
            self.tracker.unregister_dependency(parent, child);
        }
        Ok(true)
    }

    /// Feeds an external change into an input node.
    pub fn push_input(&mut self, input: NodeId, direction: Direction, tuple: Tuple) -> Result<()> {
        let entry = self.nodes.get_mut(input).ok_or(Error::InvalidNodeHandle)?;
        if entry.traits.groupable {
            return Err(Error::NotAnInput(input));
        }
        let mut outbox = Outbox::default();
        entry.behavior.batch_update(
            0,
            &[(tuple, direction.sign())],
            Timestamp::ZERO,
            &mut outbox,
        );
        self.route(input, &mut outbox);
        Ok(())
    }

    /// Sends the messages of `sender` to all of its children.
    fn route(&mut self, sender: NodeId, outbox: &mut Outbox) {
        let messages = outbox.take();
        if messages.is_empty() {
            return;
        }
        let mailboxes: Vec<MailboxId> = self.nodes[sender].children.keys().copied().collect();
        for mailbox in mailboxes {
            let proxy = self.tracker.proxify(sender, mailbox);
            for (direction, tuple, timestamp) in &messages {
                self.post(mailbox, *direction, tuple.clone(), proxy.apply(*timestamp));
            }
        }
    }

    fn post(&mut self, mailbox: MailboxId, direction: Direction, tuple: Tuple, timestamp: Timestamp) {
        let entry = &mut self.nodes[mailbox.node];
        let signal = entry.mailboxes[mailbox.port].post_message(direction, tuple, timestamp);
        match signal {
            Some(MailboxSignal::HasMessage(timestamp)) => {
                self.tracker.notify_has_message(mailbox, timestamp.into());
            }
            Some(MailboxSignal::LostAllMessages(timestamp)) => {
                let resumable = entry
                    .behavior
                    .as_resumable()
                    .and_then(ResumableNode::resumable_timestamp);
                // the receiver still has to fold at this timestamp
                if mailbox.port == RESUMPTION_PORT && resumable == Some(timestamp) {
                    return;
                }
                self.tracker.notify_lost_all_messages(mailbox, timestamp.into());
            }
            None => {}
        }
    }

    /// Delivers messages until none are left.
    pub fn deliver_messages(&mut self) {
        let mut deliveries = 0_usize;
        while let Some((mailbox, timestamp)) = self.tracker.next_delivery() {
            self.deliver(mailbox, timestamp);
            deliveries += 1;
        }
        debug!("delivered {deliveries} mailboxes");
    }

    fn deliver(&mut self, mailbox: MailboxId, timestamp: Timestamp) {
        let faithful = self.configuration.is_faithful();
        let entry = &mut self.nodes[mailbox.node];
        let updates = entry.mailboxes[mailbox.port].deliver_all(timestamp.into());
        trace!(
            "delivering {} tuples to {mailbox:?} at {timestamp}",
            updates.len()
        );

        let mut outbox = Outbox::default();
        if !updates.is_empty() {
            entry
                .behavior
                .batch_update(mailbox.port, &updates, timestamp, &mut outbox);
        }
        let mut next = None;
        if faithful {
            if let Some(resumable) = entry.behavior.as_resumable_mut() {
                if resumable.resumable_timestamp() == Some(timestamp) {
                    resumable.resume_at(timestamp, &mut outbox);
                }
                next = resumable.resumable_timestamp();
            }
        }

        self.route(mailbox.node, &mut outbox);
        if let Some(next) = next {
            self.tracker
                .notify_has_message(MailboxId::new(mailbox.node, RESUMPTION_PORT), next.into());
        }
    }

    /// Tuples currently held by `node`.
    pub fn pull_into(&self, node: NodeId) -> Result<Vec<Tuple>> {
        let mut collector = Vec::new();
        self.entry(node)?.behavior.pull_into(&mut collector);
        Ok(collector)
    }

    pub fn pull_into_with_timeline(&self, node: NodeId) -> Result<IndexMap<Tuple, Timeline>> {
        let mut collector = IndexMap::new();
        self.entry(node)?
            .behavior
            .pull_into_with_timeline(&mut collector);
        Ok(collector)
    }

    /// Whether some messages wait for delivery.
    pub fn has_pending_messages(&self) -> bool {
        !self.tracker.is_empty()
    }

    /// Drops all pending messages.
    pub fn clear(&mut self) {
        for (_, entry) in self.nodes.iter_mut() {
            for mailbox in &mut entry.mailboxes {
                mailbox.clear();
            }
        }
        self.tracker.clear();
    }
}
