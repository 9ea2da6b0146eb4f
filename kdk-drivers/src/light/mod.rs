//! Light adapter
//!
//! The fixture has a main light and a night light sharing one power
//! switch; the mode parameter selects which one is lit. One
//! [`LightController`] drives one of the two.
//!
//! | ID     | Meaning                  | Values                       |
//! |--------|--------------------------|------------------------------|
//! | `F300` | power                    | `0x30` on, `0x31` off        |
//! | `F400` | mode                     | `0x42` main, `0x43` night    |
//! | `F500` | main light brightness    | 1-100                        |
//! | `F600` | main light colour        | 1 warm - 100 cold            |
//! | `F700` | night light brightness   | 1, 50 or 100                 |

pub mod color;

use core::cell::Cell;

use heapless::Vec;
use kdk_core::{ParameterObserver, ParameterRegistry, ParameterUpdate};

pub use color::WhitePoints;

use crate::{SWITCH_OFF, SWITCH_ON};

pub const PARAM_LIGHT_POWER: u16 = 0xF300;
pub const PARAM_LIGHT_MODE: u16 = 0xF400;
pub const PARAM_LIGHT_BRIGHTNESS: u16 = 0xF500;
pub const PARAM_LIGHT_COLOR: u16 = 0xF600;
pub const PARAM_NIGHT_LIGHT_BRIGHTNESS: u16 = 0xF700;

const MODE_MAIN: u8 = 0x42;
const MODE_NIGHT: u8 = 0x43;

const BRIGHTNESS_MIN: u8 = 1;
const BRIGHTNESS_MAX: u8 = 100;

/// Which of the fixture's lights a controller drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LightKind {
    #[default]
    Main,
    Night,
}

impl LightKind {
    /// Decode a mode byte; unknown modes read as the main light
    pub fn from_mode(raw: u8) -> Self {
        if raw == MODE_NIGHT {
            LightKind::Night
        } else {
            LightKind::Main
        }
    }

    pub fn mode(self) -> u8 {
        match self {
            LightKind::Main => MODE_MAIN,
            LightKind::Night => MODE_NIGHT,
        }
    }

    pub fn brightness_param(self) -> u16 {
        match self {
            LightKind::Main => PARAM_LIGHT_BRIGHTNESS,
            LightKind::Night => PARAM_NIGHT_LIGHT_BRIGHTNESS,
        }
    }
}

/// Light state as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LightState {
    /// Lit; false while the other light owns the fixture
    pub on: bool,
    /// Percent, 1-100
    pub brightness: u8,
    /// Colour temperature; main light only
    pub mireds: Option<u16>,
}

/// Requested change; unset fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightCommand {
    pub on: Option<bool>,
    pub brightness: Option<u8>,
    pub mireds: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawLight {
    mode: u8,
    power: u8,
    brightness: u8,
    color: u8,
}

/// The night light only takes three levels
fn snap_night_brightness(value: u8) -> u8 {
    match value {
        0..=33 => 1,
        34..=66 => 50,
        _ => 100,
    }
}

/// Light adapter
#[derive(Debug)]
pub struct LightController {
    kind: LightKind,
    white: WhitePoints,
    raw: Cell<Option<RawLight>>,
    changed: Cell<bool>,
}

impl LightController {
    pub const fn new(kind: LightKind, white: WhitePoints) -> Self {
        Self {
            kind,
            white,
            raw: Cell::new(None),
            changed: Cell::new(false),
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    /// Last state read from the controller
    pub fn state(&self) -> Option<LightState> {
        self.raw.get().map(|raw| self.decode(raw))
    }

    /// The state, if it changed since the last call
    pub fn take_update(&self) -> Option<LightState> {
        if self.changed.replace(false) {
            self.state()
        } else {
            None
        }
    }

    /// Write batch for a command, merged over the last known state
    ///
    /// The batch always selects this light's mode.
    pub fn control(&self, command: LightCommand) -> Vec<ParameterUpdate, 4> {
        let current = self.state().unwrap_or(LightState {
            on: false,
            brightness: BRIGHTNESS_MAX,
            mireds: None,
        });

        let on = command.on.unwrap_or(current.on);
        let mut brightness = command
            .brightness
            .unwrap_or(current.brightness)
            .clamp(BRIGHTNESS_MIN, BRIGHTNESS_MAX);
        let power = if on { SWITCH_ON } else { SWITCH_OFF };

        let mut updates = Vec::new();
        updates.extend([
            ParameterUpdate::byte(PARAM_LIGHT_MODE, self.kind.mode()),
            ParameterUpdate::byte(PARAM_LIGHT_POWER, power),
        ]);

        match self.kind {
            LightKind::Night => {
                brightness = snap_night_brightness(brightness);
                updates.extend([ParameterUpdate::byte(
                    PARAM_NIGHT_LIGHT_BRIGHTNESS,
                    brightness,
                )]);
            }
            LightKind::Main => {
                let mireds = command
                    .mireds
                    .or(current.mireds)
                    .unwrap_or(self.white.cold_mireds);
                updates.extend([
                    ParameterUpdate::byte(PARAM_LIGHT_BRIGHTNESS, brightness),
                    ParameterUpdate::byte(PARAM_LIGHT_COLOR, self.white.from_mireds(mireds)),
                ]);
            }
        }

        updates
    }

    fn decode(&self, raw: RawLight) -> LightState {
        LightState {
            on: raw.mode == self.kind.mode() && raw.power == SWITCH_ON,
            brightness: raw.brightness,
            mireds: match self.kind {
                LightKind::Main => Some(self.white.to_mireds(raw.color)),
                LightKind::Night => None,
            },
        }
    }

    /// Check whether a poll changed anything this light shows
    fn is_changed(&self, raw: RawLight) -> bool {
        let Some(cached) = self.raw.get() else {
            return true;
        };

        if cached.mode != raw.mode {
            return true;
        }
        // The other light owns the fixture
        if LightKind::from_mode(cached.mode) != self.kind {
            return false;
        }
        if cached.power != raw.power {
            return true;
        }
        if raw.power == SWITCH_OFF {
            return false;
        }
        if cached.brightness != raw.brightness {
            return true;
        }
        self.kind == LightKind::Main && cached.color != raw.color
    }
}

impl ParameterObserver for LightController {
    fn on_parameter_update(&self, registry: &ParameterRegistry) {
        let (Some(&mode), Some(&power), Some(&brightness), Some(&color)) = (
            registry.get(PARAM_LIGHT_MODE).first(),
            registry.get(PARAM_LIGHT_POWER).first(),
            registry.get(self.kind.brightness_param()).first(),
            registry.get(PARAM_LIGHT_COLOR).first(),
        ) else {
            return;
        };

        let raw = RawLight {
            mode,
            power,
            brightness,
            color,
        };
        if self.is_changed(raw) {
            self.raw.set(Some(raw));
            self.changed.set(true);
        }
    }
}
