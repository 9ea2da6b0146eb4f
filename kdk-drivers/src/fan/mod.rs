//! Ceiling fan adapter
//!
//! | ID     | Meaning   | Values                              |
//! |--------|-----------|-------------------------------------|
//! | `8000` | power     | `0x30` on, `0x31` off               |
//! | `F000` | speed     | `0x30 + level`, level 1-10          |
//! | `F100` | direction | `0x41` forward, `0x42` reverse      |
//! | `F200` | yuragi    | oscillation, always written as off  |

use core::cell::Cell;

use kdk_core::{ParameterObserver, ParameterRegistry, ParameterUpdate};

use crate::{SWITCH_OFF, SWITCH_ON};

pub const PARAM_FAN_POWER: u16 = 0x8000;
pub const PARAM_FAN_SPEED: u16 = 0xF000;
pub const PARAM_FAN_DIRECTION: u16 = 0xF100;
pub const PARAM_FAN_YURAGI: u16 = 0xF200;

/// Number of speed levels
pub const SPEED_LEVELS: u8 = 10;

const SPEED_BASE: u8 = 0x30;
const DIRECTION_FORWARD: u8 = 0x41;
const DIRECTION_REVERSE: u8 = 0x42;

/// Rotation direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FanDirection {
    #[default]
    Forward,
    Reverse,
}

impl FanDirection {
    /// Decode a direction byte; anything but reverse reads as forward
    pub fn from_raw(raw: u8) -> Self {
        if raw == DIRECTION_REVERSE {
            FanDirection::Reverse
        } else {
            FanDirection::Forward
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            FanDirection::Forward => DIRECTION_FORWARD,
            FanDirection::Reverse => DIRECTION_REVERSE,
        }
    }
}

/// Fan state as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FanState {
    pub on: bool,
    /// Speed level, 1 to [`SPEED_LEVELS`]
    pub speed: u8,
    pub direction: FanDirection,
}

impl Default for FanState {
    fn default() -> Self {
        Self {
            on: false,
            speed: 1,
            direction: FanDirection::Forward,
        }
    }
}

impl FanState {
    fn from_raw(raw: RawFan) -> Self {
        Self {
            on: raw.power == SWITCH_ON,
            speed: raw.speed.wrapping_sub(SPEED_BASE),
            direction: FanDirection::from_raw(raw.direction),
        }
    }

    /// Parameter writes that put the fan in this state
    ///
    /// Oscillation is always switched off.
    pub fn to_updates(&self) -> [ParameterUpdate; 4] {
        let power = if self.on { SWITCH_ON } else { SWITCH_OFF };
        let speed = SPEED_BASE + self.speed.clamp(1, SPEED_LEVELS);
        [
            ParameterUpdate::byte(PARAM_FAN_POWER, power),
            ParameterUpdate::byte(PARAM_FAN_SPEED, speed),
            ParameterUpdate::byte(PARAM_FAN_DIRECTION, self.direction.raw()),
            ParameterUpdate::byte(PARAM_FAN_YURAGI, SWITCH_OFF),
        ]
    }
}

/// Requested change; unset fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanCommand {
    pub on: Option<bool>,
    pub speed: Option<u8>,
    pub direction: Option<FanDirection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawFan {
    power: u8,
    speed: u8,
    direction: u8,
}

/// Fan adapter
///
/// Register with the engine as an observer; [`FanController::take_update`]
/// then yields the new state once after each poll that changed it.
#[derive(Debug, Default)]
pub struct FanController {
    raw: Cell<Option<RawFan>>,
    changed: Cell<bool>,
}

impl FanController {
    pub const fn new() -> Self {
        Self {
            raw: Cell::new(None),
            changed: Cell::new(false),
        }
    }

    /// Last state read from the controller
    pub fn state(&self) -> Option<FanState> {
        self.raw.get().map(FanState::from_raw)
    }

    /// The state, if it changed since the last call
    pub fn take_update(&self) -> Option<FanState> {
        if self.changed.replace(false) {
            self.state()
        } else {
            None
        }
    }

    /// Write batch for a command, merged over the last known state
    pub fn control(&self, command: FanCommand) -> [ParameterUpdate; 4] {
        let current = self.state().unwrap_or_default();
        FanState {
            on: command.on.unwrap_or(current.on),
            speed: command.speed.unwrap_or(current.speed),
            direction: command.direction.unwrap_or(current.direction),
        }
        .to_updates()
    }
}

impl ParameterObserver for FanController {
    fn on_parameter_update(&self, registry: &ParameterRegistry) {
        let (Some(&power), Some(&speed), Some(&direction)) = (
            registry.get(PARAM_FAN_POWER).first(),
            registry.get(PARAM_FAN_SPEED).first(),
            registry.get(PARAM_FAN_DIRECTION).first(),
        ) else {
            return;
        };

        let raw = RawFan {
            power,
            speed,
            direction,
        };
        if self.raw.get() != Some(raw) {
            self.raw.set(Some(raw));
            self.changed.set(true);
        }
    }
}
