//! Wall button
//!
//! Short press toggles the fan, a long press toggles the main light.
//! Presses are ignored until the link is up.

use defmt::*;
use embassy_rp::gpio::Input;
use embassy_time::{Duration, Instant, Timer};
use portable_atomic::Ordering;

use crate::channels::{DeviceCommand, COMMAND_CHANNEL, LINK_READY};

const DEBOUNCE_MS: u64 = 30;
const LONG_PRESS_MS: u64 = 800;

#[embassy_executor::task]
pub async fn button_task(mut button: Input<'static>) {
    info!("Button task started");

    loop {
        button.wait_for_falling_edge().await;
        Timer::after(Duration::from_millis(DEBOUNCE_MS)).await;
        if button.is_high() {
            continue;
        }

        let pressed = Instant::now();
        button.wait_for_rising_edge().await;
        let held = pressed.elapsed();

        let command = if held >= Duration::from_millis(LONG_PRESS_MS) {
            DeviceCommand::ToggleLight
        } else {
            DeviceCommand::ToggleFan
        };

        if !LINK_READY.load(Ordering::Acquire) {
            warn!("Link not ready, {} ignored", command);
            continue;
        }
        if COMMAND_CHANNEL.try_send(command).is_err() {
            warn!("Command queue full, {} dropped", command);
        }
    }
}
