//! Board glue for the badge-core link traits.

use badge_core::link::{LinkSense, SensedLinks, SerialLink};
use embassy_stm32::gpio::Input;
use embassy_stm32::usart::{BufferedUart, BufferedUartRx, BufferedUartTx};
use embedded_io::{Read, ReadReady, Write};

/// One neighbor's UART. Reads never wait: only bytes already in the
/// receive buffer are returned.
pub struct UartLink<'d> {
    tx: BufferedUartTx<'d>,
    rx: BufferedUartRx<'d>,
}

impl<'d> UartLink<'d> {
    pub fn new(uart: BufferedUart<'d>) -> Self {
        let (tx, rx) = uart.split();
        Self { tx, rx }
    }
}

impl SerialLink for UartLink<'_> {
    fn read_byte(&mut self) -> Option<u8> {
        match self.rx.read_ready() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(_) => {
                defmt::warn!("link: receive error");
                return None;
            }
        }

        let mut byte = [0u8; 1];
        match self.rx.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(_) => {
                defmt::warn!("link: receive error");
                None
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        if self.tx.write_all(bytes).is_err() {
            defmt::warn!("link: transmit error, dropped {} bytes", bytes.len());
        }
    }
}

/// Connector presence pins, high while a neighbor is plugged in.
pub struct ConnectorSense<'d> {
    left: Input<'d>,
    right: Input<'d>,
}

impl<'d> ConnectorSense<'d> {
    pub fn new(left: Input<'d>, right: Input<'d>) -> Self {
        Self { left, right }
    }
}

impl LinkSense for ConnectorSense<'_> {
    fn sense(&self) -> SensedLinks {
        SensedLinks::new(self.left.is_high(), self.right.is_high())
    }
}
