use badge_core::config::NetworkConfig;
use badge_core::network::NetworkHandler;
use badge_core::wire::MessageCatalog;
use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::usart::{BufferedInterruptHandler, BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use static_cell::StaticCell;

use links::{ConnectorSense, UartLink};
use listener::StatusListener;

mod led_task;
mod links;
mod listener;
mod network_task;
mod report_task;

/// Serial rate shared by every badge in the chain.
const LINK_BAUD: u32 = 38_400;
const LINK_BUFFER_SIZE: usize = 64;

/// Application message carrying the sender's id and the chain length.
pub(super) const BEACON_TYPE: u8 = 10;
const BEACON_SIZE: usize = 2;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

embassy_stm32::bind_interrupts!(struct LinkIrqs {
    USART1 => BufferedInterruptHandler<hal::peripherals::USART1>;
    USART2_LPUART2 => BufferedInterruptHandler<hal::peripherals::USART2>;
});

static LEFT_TX_BUFFER: StaticCell<[u8; LINK_BUFFER_SIZE]> = StaticCell::new();
static LEFT_RX_BUFFER: StaticCell<[u8; LINK_BUFFER_SIZE]> = StaticCell::new();
static RIGHT_TX_BUFFER: StaticCell<[u8; LINK_BUFFER_SIZE]> = StaticCell::new();
static RIGHT_RX_BUFFER: StaticCell<[u8; LINK_BUFFER_SIZE]> = StaticCell::new();

fn link_config() -> UartConfig {
    let mut config = UartConfig::default();
    config.baudrate = LINK_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;
    config
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA2,
        PA3,
        PA5,
        PA9,
        PA10,
        PB4,
        PB5,
        USART1,
        USART2,
        ..
    } = hal::init(config);

    let left = BufferedUart::new(
        USART1,
        PA10,
        PA9,
        LEFT_TX_BUFFER.init([0; LINK_BUFFER_SIZE]),
        LEFT_RX_BUFFER.init([0; LINK_BUFFER_SIZE]),
        LinkIrqs,
        link_config(),
    )
    .expect("failed to initialize left link UART");

    let right = BufferedUart::new(
        USART2,
        PA3,
        PA2,
        RIGHT_TX_BUFFER.init([0; LINK_BUFFER_SIZE]),
        RIGHT_RX_BUFFER.init([0; LINK_BUFFER_SIZE]),
        LinkIrqs,
        link_config(),
    )
    .expect("failed to initialize right link UART");

    let sense = ConnectorSense::new(Input::new(PB4, Pull::Down), Input::new(PB5, Pull::Down));

    let mut catalog = MessageCatalog::new();
    catalog
        .register(BEACON_TYPE, BEACON_SIZE)
        .expect("beacon message type registration");

    let handler = NetworkHandler::new(
        NetworkConfig::default(),
        catalog,
        sense,
        UartLink::new(left),
        UartLink::new(right),
        StatusListener,
    );
    defmt::info!("badge: link rate {} baud", LINK_BAUD);

    spawner
        .spawn(network_task::run(handler))
        .expect("failed to spawn network task");

    spawner
        .spawn(led_task::run(Output::new(PA5, Level::Low, Speed::Low)))
        .expect("failed to spawn LED task");

    spawner
        .spawn(report_task::run())
        .expect("failed to spawn status report task");

    core::future::pending::<()>().await;
}
