use embassy_stm32::gpio::{Level, Output};
use embassy_time::{Duration, Ticker};

use crate::status;

const LED_REFRESH_MS: u64 = 20;

/// Lights the debug LED while this badge holds the turn.
#[embassy_executor::task]
pub async fn run(mut led: Output<'static>) -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(LED_REFRESH_MS));
    loop {
        ticker.next().await;
        led.set_level(Level::from(status::holds_turn()));
    }
}
