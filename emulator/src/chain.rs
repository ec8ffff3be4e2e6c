//! A line of simulated badges sharing one scheduler and a virtual clock.

use std::cell::{Ref, RefCell};
use std::fmt;

use badge_core::config::{MAX_SCHEDULED_TASKS, NetworkConfig};
use badge_core::link::Side;
use badge_core::loopback::{self, LoopbackHandler, Wire};
use badge_core::network::{EnqueueError, MessageDisposition, NetworkListener};
use badge_core::scheduler::{AbsoluteTime, ScheduleError, Scheduler};
use badge_core::wire::{CatalogError, MessageCatalog};

/// Virtual clock resolution.
pub const TICK_MS: AbsoluteTime = 10;

/// Longest chain one scheduler can drive.
pub const MAX_BADGES: usize = MAX_SCHEDULED_TASKS;

/// Application message types understood by every emulated badge.
pub const APPLICATION_TYPES: &[(u8, usize, &str)] = &[
    (10, 0, "ping"),
    (11, 4, "word"),
    (12, 13, "blob"),
];

pub type EmulatedBadge<'a> = LoopbackHandler<'a, Inbox>;

/// Something a badge reported to its application.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notice {
    PairingBegin,
    Paired { peer_id: u8, peer_count: u8 },
    Disconnected,
    Message { origin: Side, kind: u8, payload: Vec<u8> },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PairingBegin => f.write_str("pairing started"),
            Notice::Paired {
                peer_id,
                peer_count,
            } => write!(f, "paired as {peer_id} of {peer_count}"),
            Notice::Disconnected => f.write_str("disconnected"),
            Notice::Message {
                origin,
                kind,
                payload,
            } => {
                write!(f, "type {kind} from {}:", origin.label())?;
                if payload.is_empty() {
                    f.write_str(" (empty)")?;
                }
                for byte in payload {
                    write!(f, " {byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Listener that queues every callback for the console and relays
/// application messages along the chain.
#[derive(Debug, Default)]
pub struct Inbox {
    notices: Vec<Notice>,
}

impl Inbox {
    pub fn drain(&mut self) -> std::vec::Drain<'_, Notice> {
        self.notices.drain(..)
    }
}

impl NetworkListener for Inbox {
    fn on_disconnected(&mut self) {
        self.notices.push(Notice::Disconnected);
    }

    fn on_pairing_begin(&mut self) {
        self.notices.push(Notice::PairingBegin);
    }

    fn on_pairing_end(&mut self, peer_id: u8, peer_count: u8) {
        self.notices.push(Notice::Paired {
            peer_id,
            peer_count,
        });
    }

    fn on_message_received(&mut self, origin: Side, kind: u8, payload: &[u8]) -> MessageDisposition {
        self.notices.push(Notice::Message {
            origin,
            kind,
            payload: payload.to_vec(),
        });
        MessageDisposition::Forward
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChainError {
    NoSuchBadge(usize),
    NoSuchWire(usize),
    Enqueue(EnqueueError),
}

impl From<EnqueueError> for ChainError {
    fn from(error: EnqueueError) -> Self {
        Self::Enqueue(error)
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::NoSuchBadge(index) => write!(f, "no badge {index}"),
            ChainError::NoSuchWire(index) => write!(f, "no wire {index}"),
            ChainError::Enqueue(error) => write!(f, "enqueue failed: {error}"),
        }
    }
}

pub fn catalog() -> Result<MessageCatalog, CatalogError> {
    let mut catalog = MessageCatalog::new();
    for &(kind, payload_size, _) in APPLICATION_TYPES {
        catalog.register(kind, payload_size)?;
    }
    Ok(catalog)
}

/// Wires joining `count` badges.
pub fn wires(count: usize) -> Vec<Wire> {
    (1..count).map(|_| Wire::new()).collect()
}

/// One badge per position, plugged into its neighboring `wires`.
pub fn badges<'a>(
    wires: &'a [Wire],
    count: usize,
    config: NetworkConfig,
    catalog: &MessageCatalog,
) -> Vec<RefCell<EmulatedBadge<'a>>> {
    (0..count)
        .map(|index| {
            let (left, right) = loopback::neighbors(wires, index);
            RefCell::new(loopback::attach(
                config,
                catalog.clone(),
                left,
                right,
                Inbox::default(),
            ))
        })
        .collect()
}

pub struct Chain<'a> {
    wires: &'a [Wire],
    badges: &'a [RefCell<EmulatedBadge<'a>>],
    scheduler: Scheduler<'a, MAX_SCHEDULED_TASKS>,
    now: AbsoluteTime,
}

impl<'a> Chain<'a> {
    pub fn new(
        wires: &'a [Wire],
        badges: &'a [RefCell<EmulatedBadge<'a>>],
    ) -> Result<Self, ScheduleError> {
        let mut scheduler = Scheduler::new();
        for badge in badges {
            scheduler.schedule_periodic(badge)?;
        }

        Ok(Self {
            wires,
            badges,
            scheduler,
            now: 0,
        })
    }

    pub fn now(&self) -> AbsoluteTime {
        self.now
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    /// Runs the clock forward by `duration_ms`, rounded up to whole ticks.
    pub fn advance(&mut self, duration_ms: AbsoluteTime) {
        let until = self.now.saturating_add(duration_ms);
        while self.now < until {
            self.now += TICK_MS;
            self.scheduler.tick(self.now);
        }
    }

    pub fn badge(&self, index: usize) -> Result<Ref<'_, EmulatedBadge<'a>>, ChainError> {
        self.badges
            .get(index)
            .map(RefCell::borrow)
            .ok_or(ChainError::NoSuchBadge(index))
    }

    pub fn wire(&self, index: usize) -> Result<&'a Wire, ChainError> {
        self.wires.get(index).ok_or(ChainError::NoSuchWire(index))
    }

    pub fn set_link(&self, index: usize, connected: bool) -> Result<(), ChainError> {
        self.wire(index)?.set_connected(connected);
        Ok(())
    }

    pub fn send(
        &self,
        index: usize,
        toward: Side,
        kind: u8,
        payload: &[u8],
    ) -> Result<(), ChainError> {
        let badge = self
            .badges
            .get(index)
            .ok_or(ChainError::NoSuchBadge(index))?;
        badge.borrow_mut().enqueue_outgoing(toward, kind, payload)?;
        Ok(())
    }

    pub fn reset(&self, index: usize) -> Result<(), ChainError> {
        let badge = self
            .badges
            .get(index)
            .ok_or(ChainError::NoSuchBadge(index))?;
        badge.borrow_mut().reset();
        Ok(())
    }

    /// Takes every notice raised since the last call, in badge order.
    pub fn drain_notices(&self) -> Vec<(usize, Notice)> {
        let mut notices = Vec::new();
        for (index, badge) in self.badges.iter().enumerate() {
            notices.extend(
                badge
                    .borrow_mut()
                    .listener_mut()
                    .drain()
                    .map(|notice| (index, notice)),
            );
        }
        notices
    }

    /// Whether every badge finished discovery and agrees on the length.
    pub fn is_settled(&self) -> bool {
        let Ok(count) = u8::try_from(self.badges.len()) else {
            return false;
        };
        self.badges.iter().all(|badge| {
            let badge = badge.borrow();
            badge.is_connected() && badge.peer_count() == count
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(count: usize, test: impl FnOnce(&mut Chain<'_>)) {
        let catalog = catalog().unwrap();
        let wires = wires(count);
        let badges = badges(&wires, count, NetworkConfig::default(), &catalog);
        let mut chain = Chain::new(&wires, &badges).unwrap();
        test(&mut chain);
    }

    #[test]
    fn emulated_chain_pairs_and_reports() {
        chain_of(3, |chain| {
            chain.advance(10_000);
            assert!(chain.is_settled());

            let notices = chain.drain_notices();
            for index in 0..3 {
                let paired = Notice::Paired {
                    peer_id: u8::try_from(index).unwrap(),
                    peer_count: 3,
                };
                assert!(notices.contains(&(index, paired)), "badge {index} paired");
            }
            assert!(chain.drain_notices().is_empty(), "notices are drained");
        });
    }

    #[test]
    fn messages_are_relayed_to_the_far_end() {
        chain_of(3, |chain| {
            chain.advance(10_000);
            chain.drain_notices();

            chain.send(0, Side::Right, 11, &[1, 2, 3, 4]).unwrap();
            chain.advance(5_000);

            let received = Notice::Message {
                origin: Side::Left,
                kind: 11,
                payload: vec![1, 2, 3, 4],
            };
            let notices = chain.drain_notices();
            assert!(notices.contains(&(1, received.clone())));
            assert!(notices.contains(&(2, received)));
        });
    }

    #[test]
    fn bad_indices_are_reported() {
        chain_of(2, |chain| {
            assert_eq!(chain.set_link(1, false), Err(ChainError::NoSuchWire(1)));
            assert_eq!(chain.reset(2), Err(ChainError::NoSuchBadge(2)));
            assert!(chain.badge(5).is_err());
            assert_eq!(
                chain.send(0, Side::Right, 11, &[1]),
                Err(ChainError::Enqueue(EnqueueError::PayloadLength {
                    expected: 4,
                    actual: 1
                }))
            );
        });
    }

    #[test]
    fn catalog_lists_every_application_type() {
        let catalog = catalog().unwrap();
        for &(kind, size, _) in APPLICATION_TYPES {
            assert_eq!(catalog.payload_size(kind), Some(size));
        }
    }
}
