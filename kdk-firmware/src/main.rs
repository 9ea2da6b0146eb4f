//! KDK bridge firmware
//!
//! Runs the link engine against a KDK ceiling fan / light controller on
//! UART0 of an RP2040 board. Link timing comes from link.toml, validated
//! at build time.
//!
//! Pins (Raspberry Pi Pico):
//! - GPIO0 / GPIO1: UART0 TX / RX to the controller
//! - GPIO15: wall button to ground

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Input, Pull};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, Uart};
use kdk_hal::SerialConfig;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

mod channels;
mod config;
mod serial;
mod tasks;

use crate::serial::{uart_config, UartPort};

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

// Large enough for a maximum-size frame in either direction
static TX_BUF: StaticCell<[u8; 512]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 512]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("KDK bridge starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let line = SerialConfig::controller();
    let tx_buf = TX_BUF.init([0u8; 512]);
    let rx_buf = RX_BUF.init([0u8; 512]);

    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config(&line));
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    info!("UART initialized at {} baud", line.baudrate);

    let button = Input::new(p.PIN_15, Pull::Up);

    spawner.spawn(tasks::tick_task()).unwrap();
    spawner.spawn(tasks::link_task(UartPort::new(uart))).unwrap();
    spawner.spawn(tasks::button_task(button)).unwrap();

    info!("All tasks spawned");
}
