//! Inter-task communication channels
//!
//! Defines the static channels used between the link task and the rest of
//! the firmware. Uses embassy-sync primitives for safe async communication.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::AtomicBool;

/// Channel capacity for device commands
const COMMAND_CHANNEL_SIZE: usize = 4;

/// Requests for the controller, applied by the link task
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum DeviceCommand {
    /// Flip fan power, keeping speed and direction
    ToggleFan,
    /// Flip the main light, keeping brightness and colour
    ToggleLight,
}

pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, DeviceCommand, COMMAND_CHANNEL_SIZE> =
    Channel::new();

/// Bring-up complete and commands accepted
pub static LINK_READY: AtomicBool = AtomicBool::new(false);
