//! In-memory links used to chain badges on a host.
//!
//! A [`Wire`] is the cable between two neighboring badges: the badge on its
//! left holds it on its right connector and vice versa. Unplugging a wire
//! makes both connectors sense nothing and drops every byte in flight.

use core::cell::{Cell, RefCell};

use heapless::Deque;

use crate::config::NetworkConfig;
use crate::link::{LinkSense, SensedLinks, SerialLink, Side};
use crate::network::{NetworkHandler, NetworkListener};
use crate::wire::MessageCatalog;

/// Bytes buffered per direction before the wire starts dropping.
pub const WIRE_CAPACITY: usize = 128;

/// Cable joining two adjacent badges.
pub struct Wire {
    // Bytes travelling toward the badge on the right of the wire.
    rightward: RefCell<Deque<u8, WIRE_CAPACITY>>,
    // Bytes travelling toward the badge on the left of the wire.
    leftward: RefCell<Deque<u8, WIRE_CAPACITY>>,
    connected: Cell<bool>,
    // Drops data while still sensing as connected.
    muted: Cell<bool>,
    dropped: Cell<u32>,
}

impl Wire {
    /// A plugged-in, idle wire.
    pub const fn new() -> Self {
        Self {
            rightward: RefCell::new(Deque::new()),
            leftward: RefCell::new(Deque::new()),
            connected: Cell::new(true),
            muted: Cell::new(false),
            dropped: Cell::new(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    /// Plugs or unplugs the wire. Unplugging loses in-flight bytes.
    pub fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
        if !connected {
            self.rightward.borrow_mut().clear();
            self.leftward.borrow_mut().clear();
        }
    }

    /// Loses every byte written from now on without affecting sensing, like
    /// a broken data line on an otherwise seated connector.
    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
    }

    /// Bytes written but not yet read, in both directions.
    pub fn in_flight(&self) -> usize {
        self.rightward.borrow().len() + self.leftward.borrow().len()
    }

    /// Bytes lost to an unplugged wire or a full buffer.
    pub fn dropped(&self) -> u32 {
        self.dropped.get()
    }

    /// Queues raw bytes for the badge on `toward` side of the wire, as if
    /// they had been put on the line by its neighbor.
    pub fn inject(&self, toward: Side, bytes: &[u8]) {
        self.push(toward, bytes);
    }

    /// Connector of the badge sitting on the left of this wire.
    pub fn left_port(&self) -> Port<'_> {
        Port {
            wire: Some(self),
            peer: Side::Right,
        }
    }

    /// Connector of the badge sitting on the right of this wire.
    pub fn right_port(&self) -> Port<'_> {
        Port {
            wire: Some(self),
            peer: Side::Left,
        }
    }

    fn queue(&self, toward: Side) -> &RefCell<Deque<u8, WIRE_CAPACITY>> {
        match toward {
            Side::Left => &self.leftward,
            Side::Right => &self.rightward,
        }
    }

    fn push(&self, toward: Side, bytes: &[u8]) {
        if !self.is_connected() || self.muted.get() {
            let lost = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
            self.dropped.set(self.dropped.get().saturating_add(lost));
            return;
        }

        let mut queue = self.queue(toward).borrow_mut();
        for byte in bytes {
            if queue.push_back(*byte).is_err() {
                self.dropped.set(self.dropped.get().saturating_add(1));
            }
        }
    }

    fn pop(&self, toward: Side) -> Option<u8> {
        self.queue(toward).borrow_mut().pop_front()
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}

/// One badge's serial line on one connector.
///
/// A port without a wire models a connector with nothing plugged in: it
/// never yields data and swallows every write.
#[derive(Clone, Copy)]
pub struct Port<'a> {
    wire: Option<&'a Wire>,
    // Side of the wire the neighbor sits on.
    peer: Side,
}

impl<'a> Port<'a> {
    /// A connector with nothing plugged in.
    pub const fn unplugged() -> Self {
        Self {
            wire: None,
            peer: Side::Left,
        }
    }

    pub fn wire(&self) -> Option<&'a Wire> {
        self.wire
    }
}

impl SerialLink for Port<'_> {
    fn read_byte(&mut self) -> Option<u8> {
        self.wire.and_then(|wire| wire.pop(self.peer.opposite()))
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Some(wire) = self.wire {
            wire.push(self.peer, bytes);
        }
    }
}

/// Presence detection derived from whether the wires on each connector are
/// plugged in.
#[derive(Clone, Copy)]
pub struct Connectors<'a> {
    pub left: Option<&'a Wire>,
    pub right: Option<&'a Wire>,
}

impl<'a> Connectors<'a> {
    pub const fn new(left: Option<&'a Wire>, right: Option<&'a Wire>) -> Self {
        Self { left, right }
    }
}

impl LinkSense for Connectors<'_> {
    fn sense(&self) -> SensedLinks {
        SensedLinks::new(
            self.left.is_some_and(Wire::is_connected),
            self.right.is_some_and(Wire::is_connected),
        )
    }
}

/// Network handler running on loopback connectors.
pub type LoopbackHandler<'a, H> = NetworkHandler<Connectors<'a>, Port<'a>, Port<'a>, H>;

/// Wires on either side of badge `index` in a line of badges joined by
/// `wires`, where `wires[i]` sits between badges `i` and `i + 1`.
pub fn neighbors(wires: &[Wire], index: usize) -> (Option<&Wire>, Option<&Wire>) {
    let left = index.checked_sub(1).and_then(|previous| wires.get(previous));
    (left, wires.get(index))
}

/// Builds a handler whose connectors are plugged into `left` and `right`.
pub fn attach<'a, H: NetworkListener>(
    config: NetworkConfig,
    catalog: MessageCatalog,
    left: Option<&'a Wire>,
    right: Option<&'a Wire>,
    listener: H,
) -> LoopbackHandler<'a, H> {
    NetworkHandler::new(
        config,
        catalog,
        Connectors::new(left, right),
        left.map_or(Port::unplugged(), Wire::right_port),
        right.map_or(Port::unplugged(), Wire::left_port),
        listener,
    )
}
