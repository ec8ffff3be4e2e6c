#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The network task mirrors its session into these atomics after every
//! scheduler tick so the LED and report tasks can read the badge's
//! position in the chain without borrowing the handler.

use portable_atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

static PEER_ID: AtomicU8 = AtomicU8::new(0);
static PEER_COUNT: AtomicU8 = AtomicU8::new(1);
static CONNECTED: AtomicBool = AtomicBool::new(false);
/// Set while this badge holds the turn token.
static HOLDS_TURN: AtomicBool = AtomicBool::new(false);
static PAIRINGS: AtomicU32 = AtomicU32::new(0);
static DISCONNECTIONS: AtomicU32 = AtomicU32::new(0);
static MESSAGES: AtomicU32 = AtomicU32::new(0);
static RESETS: AtomicU32 = AtomicU32::new(0);
static RETRANSMISSIONS: AtomicU32 = AtomicU32::new(0);
static CORRUPTED: AtomicU32 = AtomicU32::new(0);

/// Session fields copied out of the network handler.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionSample {
    pub peer_id: u8,
    pub peer_count: u8,
    pub connected: bool,
    pub holds_turn: bool,
    pub resets: u32,
    pub retransmissions: u32,
    pub corrupted: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub session: SessionSample,
    pub pairings: u32,
    pub disconnections: u32,
    pub messages: u32,
}

pub fn record_session(sample: SessionSample) {
    PEER_ID.store(sample.peer_id, Ordering::Relaxed);
    PEER_COUNT.store(sample.peer_count, Ordering::Relaxed);
    CONNECTED.store(sample.connected, Ordering::Relaxed);
    HOLDS_TURN.store(sample.holds_turn, Ordering::Relaxed);
    RESETS.store(sample.resets, Ordering::Relaxed);
    RETRANSMISSIONS.store(sample.retransmissions, Ordering::Relaxed);
    CORRUPTED.store(sample.corrupted, Ordering::Relaxed);
}

pub fn record_pairing() {
    PAIRINGS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_disconnection() {
    DISCONNECTIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_message() {
    MESSAGES.fetch_add(1, Ordering::Relaxed);
}

pub fn holds_turn() -> bool {
    HOLDS_TURN.load(Ordering::Relaxed)
}

pub fn snapshot() -> StatusSnapshot {
    StatusSnapshot {
        session: SessionSample {
            peer_id: PEER_ID.load(Ordering::Relaxed),
            peer_count: PEER_COUNT.load(Ordering::Relaxed),
            connected: CONNECTED.load(Ordering::Relaxed),
            holds_turn: holds_turn(),
            resets: RESETS.load(Ordering::Relaxed),
            retransmissions: RETRANSMISSIONS.load(Ordering::Relaxed),
            corrupted: CORRUPTED.load(Ordering::Relaxed),
        },
        pairings: PAIRINGS.load(Ordering::Relaxed),
        disconnections: DISCONNECTIONS.load(Ordering::Relaxed),
        messages: MESSAGES.load(Ordering::Relaxed),
    }
}
