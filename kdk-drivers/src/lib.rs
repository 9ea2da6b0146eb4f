//! Device adapters for the KDK link
//!
//! Each adapter is a [`ParameterObserver`](kdk_core::ParameterObserver):
//! it turns polled parameter values into a typed state, and turns a
//! requested change into the parameter batch the controller expects.
//!
//! - Fan: power, speed (10 levels), direction
//! - Light: main light (brightness and colour temperature) or night light

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod fan;
pub mod light;

/// Value byte for "on" shared by every switch parameter
pub(crate) const SWITCH_ON: u8 = 0x30;

/// Value byte for "off" shared by every switch parameter
pub(crate) const SWITCH_OFF: u8 = 0x31;

pub use fan::{FanCommand, FanController, FanDirection, FanState};
pub use light::{LightCommand, LightController, LightKind, LightState, WhitePoints};
