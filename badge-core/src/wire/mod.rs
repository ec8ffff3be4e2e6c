//! Wire format shared by every badge.
//!
//! A frame is `[magic_1][magic_2][type][checksum_lo][checksum_hi][payload]`.
//! The payload length is not transmitted: it is a fixed function of the type,
//! looked up in a [`MessageCatalog`]. The checksum is a Fletcher-16 over the
//! type byte followed by the payload bytes.

use core::fmt;

use heapless::Vec;

use crate::config::{
    APPLICATION_MESSAGE_TYPE_RANGE_BEGIN, MAX_APPLICATION_MESSAGE_TYPES, MAX_PAYLOAD_SIZE,
    PROTOCOL_MAX_MESSAGE_SIZE,
};

mod receiver;

pub use receiver::{FrameReceiver, ReceiveStatus, ReceptionState};

/// First re-synchronization byte of every frame.
pub const MAGIC_1: u8 = 0b1010_1111;
/// Second re-synchronization byte of every frame.
pub const MAGIC_2: u8 = 0b1111_1010;

/// Magic bytes plus the largest message.
pub const MAX_FRAME_SIZE: usize = 2 + PROTOCOL_MAX_MESSAGE_SIZE;

/// Payload storage for one message.
pub type Payload = Vec<u8, MAX_PAYLOAD_SIZE>;

/// Encoded frame ready to be written to a link.
pub type EncodedFrame = Vec<u8, MAX_FRAME_SIZE>;

/// Message types reserved by the wire protocol.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ControlType {
    /// Turn token; holding it grants the right to transmit.
    Monitor = 3,
    /// Collapses the receiver's session.
    Reset = 4,
    /// Carries the sender's peer id toward the right.
    Announce = 5,
    /// Carries the chain length back toward the left.
    AnnounceReply = 6,
    /// Acknowledges a received frame.
    Ok = 7,
}

impl ControlType {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            3 => Some(ControlType::Monitor),
            4 => Some(ControlType::Reset),
            5 => Some(ControlType::Announce),
            6 => Some(ControlType::AnnounceReply),
            7 => Some(ControlType::Ok),
            _ => None,
        }
    }

    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    pub const fn payload_size(self) -> usize {
        match self {
            ControlType::Announce | ControlType::AnnounceReply => 1,
            ControlType::Monitor | ControlType::Reset | ControlType::Ok => 0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ControlType::Monitor => "MONITOR",
            ControlType::Reset => "RESET",
            ControlType::Announce => "ANNOUNCE",
            ControlType::AnnounceReply => "ANNOUNCE_REPLY",
            ControlType::Ok => "OK",
        }
    }
}

/// Returns `true` when `raw` falls in the application type range.
pub const fn is_application_type(raw: u8) -> bool {
    raw >= APPLICATION_MESSAGE_TYPE_RANGE_BEGIN
}

/// Fletcher-16 running checksum with 8-bit wrapping sums.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Fletcher16 {
    sum_low: u8,
    sum_high: u8,
}

impl Fletcher16 {
    pub const fn new() -> Self {
        Self {
            sum_low: 0,
            sum_high: 0,
        }
    }

    pub fn push(&mut self, value: u8) {
        self.sum_low = self.sum_low.wrapping_add(value);
        self.sum_high = self.sum_high.wrapping_add(self.sum_low);
    }

    pub fn push_all(&mut self, values: &[u8]) {
        for value in values {
            self.push(*value);
        }
    }

    pub const fn checksum(&self) -> u16 {
        ((self.sum_high as u16) << 8) | self.sum_low as u16
    }
}

/// Checksum covering a message's type byte and payload.
pub fn message_checksum(kind: u8, payload: &[u8]) -> u16 {
    let mut checksum = Fletcher16::new();
    checksum.push(kind);
    checksum.push_all(payload);
    checksum.checksum()
}

/// Errors reported while registering application message types.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CatalogError {
    /// The type id belongs to the wire protocol.
    Reserved(u8),
    /// The declared payload does not fit in a frame.
    PayloadTooLarge(usize),
    /// No room left for another type.
    Full,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Reserved(kind) => write!(f, "message type {kind} is reserved"),
            CatalogError::PayloadTooLarge(size) => {
                write!(f, "payload of {size} bytes exceeds {MAX_PAYLOAD_SIZE}")
            }
            CatalogError::Full => f.write_str("message catalog is full"),
        }
    }
}

/// Type → payload length table shared by both ends of every link.
#[derive(Clone, Debug, Default)]
pub struct MessageCatalog {
    application: Vec<(u8, u8), MAX_APPLICATION_MESSAGE_TYPES>,
}

impl MessageCatalog {
    /// Catalog knowing only the control messages.
    pub const fn new() -> Self {
        Self {
            application: Vec::new(),
        }
    }

    /// Declares (or redeclares) the fixed payload length of an application type.
    pub fn register(&mut self, kind: u8, payload_size: usize) -> Result<(), CatalogError> {
        if !is_application_type(kind) {
            return Err(CatalogError::Reserved(kind));
        }

        let size = u8::try_from(payload_size)
            .ok()
            .filter(|size| usize::from(*size) <= MAX_PAYLOAD_SIZE)
            .ok_or(CatalogError::PayloadTooLarge(payload_size))?;

        if let Some(entry) = self.application.iter_mut().find(|(known, _)| *known == kind) {
            entry.1 = size;
            return Ok(());
        }

        self.application
            .push((kind, size))
            .map_err(|_| CatalogError::Full)
    }

    /// Payload length for `kind`, or `None` when the type is unknown.
    pub fn payload_size(&self, kind: u8) -> Option<usize> {
        if let Some(control) = ControlType::from_raw(kind) {
            return Some(control.payload_size());
        }

        self.application
            .iter()
            .find(|(known, _)| *known == kind)
            .map(|(_, size)| usize::from(*size))
    }
}

/// A complete, validated message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Payload,
}

impl Frame {
    /// Builds a frame, returning `None` if the payload does not fit.
    pub fn new(kind: u8, payload: &[u8]) -> Option<Self> {
        Payload::from_slice(payload)
            .ok()
            .map(|payload| Self { kind, payload })
    }

    pub fn control(kind: ControlType) -> Self {
        Self {
            kind: kind.as_raw(),
            payload: Payload::new(),
        }
    }

    pub fn announce(peer_id: u8) -> Self {
        Self::with_byte(ControlType::Announce, peer_id)
    }

    pub fn announce_reply(peer_count: u8) -> Self {
        Self::with_byte(ControlType::AnnounceReply, peer_count)
    }

    fn with_byte(kind: ControlType, value: u8) -> Self {
        let mut frame = Self::control(kind);
        // Control frames start empty; one byte always fits.
        let _ = frame.payload.push(value);
        frame
    }

    /// Control type of this frame, if it is one.
    pub fn control_type(&self) -> Option<ControlType> {
        ControlType::from_raw(self.kind)
    }

    pub fn is_control(&self, kind: ControlType) -> bool {
        self.kind == kind.as_raw()
    }

    /// First payload byte, used by ANNOUNCE and ANNOUNCE_REPLY.
    pub fn first_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    pub fn checksum(&self) -> u16 {
        message_checksum(self.kind, &self.payload)
    }

    /// Serializes the frame with its magic bytes and checksum.
    pub fn encode(&self) -> EncodedFrame {
        let mut bytes = EncodedFrame::new();
        let [checksum_lo, checksum_hi] = self.checksum().to_le_bytes();
        // MAX_FRAME_SIZE covers the header and the largest payload.
        let _ = bytes.extend_from_slice(&[MAGIC_1, MAGIC_2, self.kind, checksum_lo, checksum_hi]);
        let _ = bytes.extend_from_slice(&self.payload);
        bytes
    }
}
