//! Controller UART as a [`SerialPort`]
//!
//! The engine polls from its tick, so the adapter uses the buffered UART's
//! blocking `embedded-io` side: reads only happen after `read_ready` says a
//! byte is buffered, and writes complete once the frame fits in the TX ring.

use embassy_rp::uart::{self, BufferedUart, Config as UartConfig};
use embedded_io::{Read, ReadReady, Write};
use kdk_hal::{DataBits, Parity, SerialConfig, SerialPort, StopBits};

/// Map line settings onto the RP2040 UART configuration
pub fn uart_config(line: &SerialConfig) -> UartConfig {
    let mut config = UartConfig::default();
    config.baudrate = line.baudrate;
    config.data_bits = match line.data_bits {
        DataBits::Seven => uart::DataBits::DataBits7,
        DataBits::Eight => uart::DataBits::DataBits8,
    };
    config.parity = match line.parity {
        Parity::None => uart::Parity::ParityNone,
        Parity::Even => uart::Parity::ParityEven,
        Parity::Odd => uart::Parity::ParityOdd,
    };
    config.stop_bits = match line.stop_bits {
        StopBits::One => uart::StopBits::STOP1,
        StopBits::Two => uart::StopBits::STOP2,
    };
    config
}

pub struct UartPort {
    uart: BufferedUart,
}

impl UartPort {
    pub fn new(uart: BufferedUart) -> Self {
        Self { uart }
    }
}

impl SerialPort for UartPort {
    type Error = uart::Error;

    fn bytes_available(&mut self) -> bool {
        self.uart.read_ready().unwrap_or(false)
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut byte = [0u8; 1];
        self.uart.read(&mut byte)?;
        Ok(byte[0])
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.uart.write_all(data)
    }
}
