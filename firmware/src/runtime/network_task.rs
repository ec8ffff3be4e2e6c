use core::cell::RefCell;

use badge_core::config::MAX_SCHEDULED_TASKS;
use badge_core::link::Side;
use badge_core::network::NetworkHandler;
use badge_core::scheduler::Scheduler;
use embassy_time::{Duration, Instant, Ticker};

use super::BEACON_TYPE;
use super::links::{ConnectorSense, UartLink};
use super::listener::StatusListener;
use crate::status::{self, SessionSample};

/// Resolution of the scheduler clock.
const SCHEDULER_TICK_MS: u64 = 10;

pub type BadgeHandler = NetworkHandler<
    ConnectorSense<'static>,
    UartLink<'static>,
    UartLink<'static>,
    StatusListener,
>;

#[embassy_executor::task]
pub async fn run(handler: BadgeHandler) -> ! {
    let handler = RefCell::new(handler);
    let mut scheduler: Scheduler<'_, MAX_SCHEDULED_TASKS> = Scheduler::new();
    scheduler
        .schedule_periodic(&handler)
        .expect("network handler fits in the scheduler");

    let mut ticker = Ticker::every(Duration::from_millis(SCHEDULER_TICK_MS));
    let mut beacon_sent = false;
    loop {
        ticker.next().await;
        scheduler.tick(Instant::now().as_millis());

        let mut handler = handler.borrow_mut();
        status::record_session(sample(&handler));

        if !handler.is_connected() {
            beacon_sent = false;
            continue;
        }

        // The left end introduces itself once per session.
        if !beacon_sent && handler.peer_id() == 0 && handler.peer_count() > 1 {
            let beacon = [handler.peer_id(), handler.peer_count()];
            if let Err(error) = handler.enqueue_outgoing(Side::Right, BEACON_TYPE, &beacon) {
                defmt::warn!("badge: beacon not queued: {}", error);
            }
            beacon_sent = true;
        }
    }
}

fn sample(handler: &BadgeHandler) -> SessionSample {
    let stats = handler.stats();
    SessionSample {
        peer_id: handler.peer_id(),
        peer_count: handler.peer_count(),
        connected: handler.is_connected(),
        holds_turn: handler.holds_turn(),
        resets: stats.resets,
        retransmissions: stats.retransmissions,
        corrupted: stats.corrupted,
    }
}
