use core::fmt;

use crate::link::Side;

/// What the application wants done with a received application message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageDisposition {
    /// Relay the message unchanged to the other side. End nodes have no
    /// other side and treat this as [`Swallow`](Self::Swallow).
    Forward,
    /// Consume the message here.
    Swallow,
    /// Discard the session.
    Reset,
}

/// Callbacks the network handler invokes on the owning application.
///
/// Every callback runs synchronously inside the handler's tick and must not
/// block.
pub trait NetworkListener {
    /// The node left a running session.
    fn on_disconnected(&mut self) {}

    /// A topology change started a new discovery attempt.
    fn on_pairing_begin(&mut self) {}

    /// Discovery finished; fired once per session.
    fn on_pairing_end(&mut self, peer_id: u8, peer_count: u8) {
        let _ = (peer_id, peer_count);
    }

    /// An application-range message arrived from `origin`.
    fn on_message_received(&mut self, origin: Side, kind: u8, payload: &[u8]) -> MessageDisposition {
        let _ = (origin, kind, payload);
        MessageDisposition::Swallow
    }
}

impl NetworkListener for () {}

impl<T: NetworkListener + ?Sized> NetworkListener for &mut T {
    fn on_disconnected(&mut self) {
        (**self).on_disconnected();
    }

    fn on_pairing_begin(&mut self) {
        (**self).on_pairing_begin();
    }

    fn on_pairing_end(&mut self, peer_id: u8, peer_count: u8) {
        (**self).on_pairing_end(peer_id, peer_count);
    }

    fn on_message_received(&mut self, origin: Side, kind: u8, payload: &[u8]) -> MessageDisposition {
        (**self).on_message_received(origin, kind, payload)
    }
}

/// Reasons an outgoing application message was not queued.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EnqueueError {
    /// A message is already waiting for its turn.
    QueueFull,
    /// No neighbor on the requested side. The session has been reset.
    Unconnected,
    /// The type is reserved or was never registered.
    UnknownMessageType(u8),
    /// The payload does not match the registered length.
    PayloadLength { expected: usize, actual: usize },
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::QueueFull => f.write_str("an outgoing message is already pending"),
            EnqueueError::Unconnected => f.write_str("no neighbor in that direction"),
            EnqueueError::UnknownMessageType(kind) => {
                write!(f, "message type {kind} is not a registered application type")
            }
            EnqueueError::PayloadLength { expected, actual } => {
                write!(f, "payload is {actual} bytes, type expects {expected}")
            }
        }
    }
}
