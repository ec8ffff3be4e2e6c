//! Counters and a short event history kept by the network handler.
//!
//! Nothing here influences the protocol; it exists so host tooling and the
//! firmware status block can explain why a session went away.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::link::SensedLinks;
use crate::scheduler::AbsoluteTime;

/// Number of events retained by [`NetworkLog`].
pub const NETWORK_LOG_CAPACITY: usize = 32;

/// Why a protocol session was discarded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetReason {
    /// A neighbor was plugged or unplugged.
    TopologyChanged,
    /// A frame arrived that the current state does not accept.
    ProtocolError,
    /// No validated frame within the session timeout.
    Timeout,
    /// The neighbor sent RESET.
    PeerReset,
    /// The application asked for it from its message callback.
    ApplicationRequest,
    /// An outgoing message targeted a side with no neighbor.
    InvalidDirection,
    /// Requested through [`reset`](crate::network::NetworkHandler::reset).
    Explicit,
}

impl ResetReason {
    pub const fn label(self) -> &'static str {
        match self {
            ResetReason::TopologyChanged => "topology-changed",
            ResetReason::ProtocolError => "protocol-error",
            ResetReason::Timeout => "timeout",
            ResetReason::PeerReset => "peer-reset",
            ResetReason::ApplicationRequest => "application-request",
            ResetReason::InvalidDirection => "invalid-direction",
            ResetReason::Explicit => "explicit",
        }
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Session-level events worth remembering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkEvent {
    TopologyChanged(SensedLinks),
    Reset(ResetReason),
    PairingBegin,
    PairingEnd { peer_id: u8, peer_count: u8 },
    Disconnected,
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEvent::TopologyChanged(sensed) => write!(
                f,
                "topology left={} right={}",
                u8::from(sensed.left),
                u8::from(sensed.right)
            ),
            NetworkEvent::Reset(reason) => write!(f, "reset ({reason})"),
            NetworkEvent::PairingBegin => f.write_str("pairing-begin"),
            NetworkEvent::PairingEnd {
                peer_id,
                peer_count,
            } => write!(f, "pairing-end id={peer_id} count={peer_count}"),
            NetworkEvent::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Timestamped [`NetworkEvent`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkRecord {
    pub at: AbsoluteTime,
    pub event: NetworkEvent,
}

/// Traffic counters. They survive resets.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkStats {
    /// Validated frames received.
    pub received: u32,
    /// Frames written, retransmissions and acknowledgements included.
    pub sent: u32,
    pub retransmissions: u32,
    /// Frames dropped for a checksum mismatch or an unknown type.
    pub corrupted: u32,
    /// Stray bytes skipped while looking for a frame start. The checksum and
    /// payload of a frame with an unregistered type land here too.
    pub resyncs: u32,
    /// Frames dropped because their type is not in the catalog. Also counted
    /// in `corrupted`.
    pub unknown_types: u32,
    pub resets: u32,
}

/// Ring of the most recent network events, oldest entries overwritten first.
pub struct NetworkLog<const CAPACITY: usize = NETWORK_LOG_CAPACITY> {
    ring: HistoryBuf<NetworkRecord, CAPACITY>,
    total: u32,
}

impl<const CAPACITY: usize> NetworkLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            total: 0,
        }
    }

    pub fn record(&mut self, at: AbsoluteTime, event: NetworkEvent) {
        self.total = self.total.wrapping_add(1);
        self.ring.write(NetworkRecord { at, event });
    }

    /// Retained records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, NetworkRecord> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&NetworkRecord> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Events recorded since creation, including overwritten ones.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Number of retained records matching `event`.
    pub fn count(&self, event: NetworkEvent) -> usize {
        self.oldest_first().filter(|record| record.event == event).count()
    }
}

impl<const CAPACITY: usize> Default for NetworkLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
