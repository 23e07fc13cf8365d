//! Classical packets and the send outbox.

use crate::ids::NodeName;
use crate::message::ClassicMessage;

/// A classical message in flight between two nodes.
///
/// `attachment` models physical state that the protocol hands over alongside
/// a message delivery (the local half of a remotely swapped pair); it is
/// transport-level and never part of the JSON payload.
#[derive(Debug, Clone)]
pub struct ClassicPacket<A> {
    pub src: NodeName,
    pub dest: NodeName,
    pub msg: ClassicMessage,
    pub attachment: Option<A>,
}

impl<A> ClassicPacket<A> {
    pub fn new(src: impl Into<NodeName>, dest: impl Into<NodeName>, msg: ClassicMessage) -> Self {
        ClassicPacket {
            src: src.into(),
            dest: dest.into(),
            msg,
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: A) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// One queued send: the packet plus the neighbor it leaves through.
#[derive(Debug, Clone)]
pub struct Outgoing<A> {
    pub next_hop: NodeName,
    pub packet: ClassicPacket<A>,
}

/// Buffer of sends produced by one handler invocation.
///
/// Handlers push here; the network drains the buffer afterwards and turns
/// each entry into a delivery event after the channel delay, so a message is
/// only observable strictly later than its send.
#[derive(Debug)]
pub struct Outbox<A> {
    queue: Vec<Outgoing<A>>,
}

impl<A> Default for Outbox<A> {
    fn default() -> Self {
        Outbox { queue: Vec::new() }
    }
}

impl<A> Outbox<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, next_hop: impl Into<NodeName>, packet: ClassicPacket<A>) {
        self.queue.push(Outgoing {
            next_hop: next_hop.into(),
            packet,
        });
    }

    pub fn drain(&mut self) -> Vec<Outgoing<A>> {
        std::mem::take(&mut self.queue)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
