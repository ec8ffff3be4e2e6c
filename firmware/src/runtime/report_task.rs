use embassy_time::{Duration, Ticker};

use crate::status;

const REPORT_INTERVAL_SECS: u64 = 10;

/// Logs the status block at a fixed interval.
#[embassy_executor::task]
pub async fn run() -> ! {
    let mut ticker = Ticker::every(Duration::from_secs(REPORT_INTERVAL_SECS));
    loop {
        ticker.next().await;
        let snapshot = status::snapshot();
        let session = snapshot.session;
        defmt::info!(
            "status: id={} count={} connected={} turn={} pairings={} disconnects={} messages={} resets={} retx={} corrupted={}",
            session.peer_id,
            session.peer_count,
            session.connected,
            session.holds_turn,
            snapshot.pairings,
            snapshot.disconnections,
            snapshot.messages,
            session.resets,
            session.retransmissions,
            session.corrupted
        );
    }
}
