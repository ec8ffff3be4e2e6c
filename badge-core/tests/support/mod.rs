#![allow(dead_code)]

use core::cell::RefCell;

use badge_core::config::{MAX_SCHEDULED_TASKS, NetworkConfig};
use badge_core::diagnostics::{NetworkEvent, ResetReason};
use badge_core::link::Side;
use badge_core::loopback::{self, LoopbackHandler, Wire};
use badge_core::network::{MessageDisposition, NetworkListener};
use badge_core::scheduler::{AbsoluteTime, Scheduler};
use badge_core::wire::MessageCatalog;

/// Application type carrying four bytes.
pub const GREETING: u8 = 20;
/// Application type with an empty payload.
pub const PING: u8 = 21;

/// Granularity of the simulated clock.
pub const TICK_MS: AbsoluteTime = 25;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Received {
    pub origin: Side,
    pub kind: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub struct Recorder {
    pub pairing_begins: u32,
    pub pairings: Vec<(u8, u8)>,
    pub disconnections: u32,
    pub messages: Vec<Received>,
    pub disposition: MessageDisposition,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            pairing_begins: 0,
            pairings: Vec::new(),
            disconnections: 0,
            messages: Vec::new(),
            disposition: MessageDisposition::Swallow,
        }
    }
}

impl NetworkListener for Recorder {
    fn on_disconnected(&mut self) {
        self.disconnections += 1;
    }

    fn on_pairing_begin(&mut self) {
        self.pairing_begins += 1;
    }

    fn on_pairing_end(&mut self, peer_id: u8, peer_count: u8) {
        self.pairings.push((peer_id, peer_count));
    }

    fn on_message_received(&mut self, origin: Side, kind: u8, payload: &[u8]) -> MessageDisposition {
        self.messages.push(Received {
            origin,
            kind,
            payload: payload.to_vec(),
        });
        self.disposition
    }
}

pub type Badge<'a> = LoopbackHandler<'a, Recorder>;

pub fn catalog() -> MessageCatalog {
    let mut catalog = MessageCatalog::new();
    catalog.register(GREETING, 4).expect("greeting registers");
    catalog.register(PING, 0).expect("ping registers");
    catalog
}

/// Wires for a line of `badges` badges.
pub fn wires(badges: usize) -> Vec<Wire> {
    (1..badges).map(|_| Wire::new()).collect()
}

/// Badges `0..count` left to right, joined by `wires`.
pub fn badges(wires: &[Wire], count: usize) -> Vec<RefCell<Badge<'_>>> {
    (0..count)
        .map(|index| {
            let (left, right) = loopback::neighbors(wires, index);
            RefCell::new(loopback::attach(
                NetworkConfig::default(),
                catalog(),
                left,
                right,
                Recorder::default(),
            ))
        })
        .collect()
}

/// Drives every badge from one scheduler and a simulated clock.
pub struct Clock<'a> {
    scheduler: Scheduler<'a, MAX_SCHEDULED_TASKS>,
    now: AbsoluteTime,
}

impl<'a> Clock<'a> {
    pub fn start(badges: &'a [RefCell<Badge<'a>>]) -> Self {
        let mut scheduler = Scheduler::new();
        for badge in badges {
            scheduler
                .schedule_periodic(badge)
                .expect("every badge fits in the scheduler");
        }
        Self { scheduler, now: 0 }
    }

    pub fn now(&self) -> AbsoluteTime {
        self.now
    }

    pub fn advance(&mut self, duration_ms: AbsoluteTime) {
        let until = self.now + duration_ms;
        while self.now < until {
            self.now += TICK_MS;
            self.scheduler.tick(self.now);
        }
    }

    /// Advances until `done` holds or `limit_ms` elapse. Returns whether
    /// `done` was reached.
    pub fn run_until(&mut self, limit_ms: AbsoluteTime, mut done: impl FnMut() -> bool) -> bool {
        let until = self.now + limit_ms;
        while self.now < until {
            if done() {
                return true;
            }
            self.advance(TICK_MS);
        }
        done()
    }
}

/// Every badge is running and agrees on `count`.
pub fn settled(badges: &[RefCell<Badge<'_>>], count: u8) -> bool {
    badges.iter().all(|badge| {
        let badge = badge.borrow();
        badge.is_connected() && badge.peer_count() == count
    })
}

pub fn ids(badges: &[RefCell<Badge<'_>>]) -> Vec<u8> {
    badges.iter().map(|badge| badge.borrow().peer_id()).collect()
}

/// Number of retained resets for `reason`.
pub fn resets(badge: &RefCell<Badge<'_>>, reason: ResetReason) -> usize {
    badge.borrow().log().count(NetworkEvent::Reset(reason))
}
