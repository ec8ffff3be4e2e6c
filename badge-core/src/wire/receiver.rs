use crate::config::WIRE_HEADER_SIZE;
use crate::link::SerialLink;

use super::{Frame, MAGIC_1, MAGIC_2, MessageCatalog, Payload, message_checksum};

/// Position of the receiver inside the frame currently being assembled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceptionState {
    AwaitMagic1,
    AwaitMagic2,
    /// Collecting the type byte and the two checksum bytes.
    AwaitHeader { received: u8 },
    /// Collecting `expected` payload bytes.
    AwaitPayload { expected: u8 },
}

/// Outcome of draining a link into the receiver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReceiveStatus {
    /// The link had no byte to offer.
    NoData,
    /// Bytes were consumed but no frame is finished yet.
    Incomplete,
    /// A frame failed validation and was discarded.
    Corrupted,
    /// A frame passed validation.
    Complete(Frame),
}

/// Byte-at-a-time frame decoder for one link.
///
/// Frame boundaries are recovered from the magic bytes alone, so any amount
/// of noise on the line is skipped without losing the following frame.
#[derive(Clone, Debug)]
pub struct FrameReceiver {
    state: ReceptionState,
    kind: u8,
    checksum: [u8; 2],
    payload: Payload,
    resyncs: u32,
    unknown_types: u32,
}

impl FrameReceiver {
    pub const fn new() -> Self {
        Self {
            state: ReceptionState::AwaitMagic1,
            kind: 0,
            checksum: [0; 2],
            payload: Payload::new(),
            resyncs: 0,
            unknown_types: 0,
        }
    }

    pub const fn state(&self) -> ReceptionState {
        self.state
    }

    /// Bytes skipped while hunting for a frame start, since creation.
    ///
    /// A frame whose type is not in the catalog is abandoned right after the
    /// type byte, so its checksum and payload are counted here as well.
    pub const fn resyncs(&self) -> u32 {
        self.resyncs
    }

    /// Frames abandoned for an unregistered type, since creation.
    pub const fn unknown_types(&self) -> u32 {
        self.unknown_types
    }

    /// Drops any partially assembled frame.
    pub fn reset(&mut self) {
        self.state = ReceptionState::AwaitMagic1;
        self.payload.clear();
    }

    /// Reads from `link` until a frame completes, fails, or the link runs dry.
    ///
    /// Bytes following a finished frame stay in the link for the next call.
    pub fn poll<L: SerialLink + ?Sized>(
        &mut self,
        link: &mut L,
        catalog: &MessageCatalog,
    ) -> ReceiveStatus {
        let mut consumed = false;

        while let Some(byte) = link.read_byte() {
            consumed = true;
            if let Some(status) = self.advance(byte, catalog) {
                return status;
            }
        }

        if consumed {
            ReceiveStatus::Incomplete
        } else {
            ReceiveStatus::NoData
        }
    }

    /// Feeds a single byte. Returns a status once a frame is finished.
    pub fn advance(&mut self, byte: u8, catalog: &MessageCatalog) -> Option<ReceiveStatus> {
        match self.state {
            ReceptionState::AwaitMagic1 => {
                if byte == MAGIC_1 {
                    self.state = ReceptionState::AwaitMagic2;
                } else {
                    self.skip(byte);
                }
                None
            }
            ReceptionState::AwaitMagic2 => {
                if byte == MAGIC_2 {
                    self.payload.clear();
                    self.state = ReceptionState::AwaitHeader { received: 0 };
                } else if byte != MAGIC_1 {
                    self.skip(byte);
                    self.state = ReceptionState::AwaitMagic1;
                }
                None
            }
            ReceptionState::AwaitHeader { received: 0 } => {
                if catalog.payload_size(byte).is_none() {
                    debug!("wire: unknown message type {}", byte);
                    self.unknown_types = self.unknown_types.wrapping_add(1);
                    self.state = ReceptionState::AwaitMagic1;
                    return Some(ReceiveStatus::Corrupted);
                }
                self.kind = byte;
                self.state = ReceptionState::AwaitHeader { received: 1 };
                None
            }
            ReceptionState::AwaitHeader { received } => {
                self.checksum[usize::from(received) - 1] = byte;
                let received = received + 1;
                if usize::from(received) < WIRE_HEADER_SIZE {
                    self.state = ReceptionState::AwaitHeader { received };
                    return None;
                }

                let expected = catalog.payload_size(self.kind).unwrap_or(0);
                if expected == 0 {
                    return Some(self.finish());
                }
                self.state = ReceptionState::AwaitPayload {
                    expected: u8::try_from(expected).unwrap_or(u8::MAX),
                };
                None
            }
            ReceptionState::AwaitPayload { expected } => {
                if self.payload.push(byte).is_err() {
                    self.state = ReceptionState::AwaitMagic1;
                    return Some(ReceiveStatus::Corrupted);
                }
                if self.payload.len() < usize::from(expected) {
                    return None;
                }
                Some(self.finish())
            }
        }
    }

    fn finish(&mut self) -> ReceiveStatus {
        self.state = ReceptionState::AwaitMagic1;

        let received = u16::from_le_bytes(self.checksum);
        let computed = message_checksum(self.kind, &self.payload);
        if received != computed {
            debug!(
                "wire: checksum mismatch for type {}: got {}, expected {}",
                self.kind, received, computed
            );
            self.payload.clear();
            return ReceiveStatus::Corrupted;
        }

        let payload = core::mem::take(&mut self.payload);
        ReceiveStatus::Complete(Frame {
            kind: self.kind,
            payload,
        })
    }

    fn skip(&mut self, byte: u8) {
        self.resyncs = self.resyncs.wrapping_add(1);
        trace!("wire: skipping stray byte {}", byte);
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ControlType;
    use heapless::Deque;

    struct Bytes(Deque<u8, 64>);

    impl Bytes {
        fn of(bytes: &[u8]) -> Self {
            let mut queue = Deque::new();
            for byte in bytes {
                queue.push_back(*byte).unwrap();
            }
            Self(queue)
        }
    }

    impl SerialLink for Bytes {
        fn read_byte(&mut self) -> Option<u8> {
            self.0.pop_front()
        }

        fn write(&mut self, _: &[u8]) {}
    }

    #[test]
    fn empty_link_reports_no_data() {
        let mut receiver = FrameReceiver::new();
        let mut link = Bytes::of(&[]);
        assert_eq!(
            receiver.poll(&mut link, &MessageCatalog::new()),
            ReceiveStatus::NoData
        );
    }

    #[test]
    fn frame_split_across_polls_is_reassembled() {
        let catalog = MessageCatalog::new();
        let encoded = Frame::announce_reply(4).encode();
        let (head, tail) = encoded.split_at(4);

        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut Bytes::of(head), &catalog),
            ReceiveStatus::Incomplete
        );
        assert_eq!(
            receiver.state(),
            ReceptionState::AwaitHeader { received: 2 }
        );
        assert_eq!(
            receiver.poll(&mut Bytes::of(tail), &catalog),
            ReceiveStatus::Complete(Frame::announce_reply(4))
        );
    }

    #[test]
    fn noise_before_frame_is_skipped() {
        let catalog = MessageCatalog::new();
        let mut bytes = [0u8; 10];
        bytes[..4].copy_from_slice(&[0x00, MAGIC_1, 0x13, MAGIC_1]);
        let frame = Frame::control(ControlType::Ok).encode();
        bytes[4..4 + frame.len()].copy_from_slice(&frame);
        let mut link = Bytes::of(&bytes[..4 + frame.len()]);

        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut link, &catalog),
            ReceiveStatus::Complete(Frame::control(ControlType::Ok))
        );
        assert_eq!(receiver.resyncs(), 2);
    }

    #[test]
    fn repeated_first_magic_still_locks_on() {
        let catalog = MessageCatalog::new();
        let mut link = Bytes::of(&[MAGIC_1, MAGIC_1, MAGIC_2, 7, 7, 7]);
        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut link, &catalog),
            ReceiveStatus::Complete(Frame::control(ControlType::Ok))
        );
    }

    #[test]
    fn flipped_payload_bit_is_corrupted() {
        let catalog = MessageCatalog::new();
        let mut encoded = Frame::announce(1).encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x04;

        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut Bytes::of(&encoded), &catalog),
            ReceiveStatus::Corrupted
        );
        assert_eq!(receiver.state(), ReceptionState::AwaitMagic1);
    }

    #[test]
    fn unregistered_type_is_corrupted() {
        let catalog = MessageCatalog::new();
        let frame = Frame::new(42, &[]).unwrap().encode();
        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut Bytes::of(&frame), &catalog),
            ReceiveStatus::Corrupted
        );
        assert_eq!(receiver.unknown_types(), 1);
    }

    #[test]
    fn unregistered_type_is_told_apart_from_noise() {
        let catalog = MessageCatalog::new();
        let mut bytes: heapless::Vec<u8, 32> = heapless::Vec::new();
        bytes
            .extend_from_slice(&Frame::new(42, &[0x11, 0x22]).unwrap().encode())
            .unwrap();
        bytes
            .extend_from_slice(&Frame::control(ControlType::Monitor).encode())
            .unwrap();
        let mut link = Bytes::of(&bytes);

        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut link, &catalog),
            ReceiveStatus::Corrupted
        );
        assert_eq!(
            receiver.poll(&mut link, &catalog),
            ReceiveStatus::Complete(Frame::control(ControlType::Monitor))
        );
        assert_eq!(receiver.unknown_types(), 1);
        // Checksum and payload of the dropped frame.
        assert_eq!(receiver.resyncs(), 4);
    }

    #[test]
    fn application_payload_uses_catalog_length() {
        let mut catalog = MessageCatalog::new();
        catalog.register(20, 3).unwrap();
        let frame = Frame::new(20, &[1, 2, 3]).unwrap();
        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut Bytes::of(&frame.encode()), &catalog),
            ReceiveStatus::Complete(frame)
        );
    }

    #[test]
    fn bytes_after_a_frame_stay_in_the_link() {
        let catalog = MessageCatalog::new();
        let mut bytes: heapless::Vec<u8, 32> = heapless::Vec::new();
        bytes
            .extend_from_slice(&Frame::control(ControlType::Monitor).encode())
            .unwrap();
        bytes
            .extend_from_slice(&Frame::control(ControlType::Ok).encode())
            .unwrap();
        let mut link = Bytes::of(&bytes);

        let mut receiver = FrameReceiver::new();
        assert_eq!(
            receiver.poll(&mut link, &catalog),
            ReceiveStatus::Complete(Frame::control(ControlType::Monitor))
        );
        assert_eq!(
            receiver.poll(&mut link, &catalog),
            ReceiveStatus::Complete(Frame::control(ControlType::Ok))
        );
    }
}
