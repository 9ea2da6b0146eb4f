//! Board-agnostic link engine for KDK ceiling fan / light controllers
//!
//! This crate contains everything above the byte-level serial port:
//!
//! - Link state machine (bring-up chain, polling, writes)
//! - Transmit path with counter, retransmission and recovery
//! - Parameter registry fed by the controller's own table
//! - Observer trait for value change notification
//! - Link timing configuration
//!
//! The engine is driven by [`Engine::tick`] with a monotonic millisecond
//! clock and never blocks.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to later modules
#[macro_use]
mod fmt;

pub mod config;
pub mod engine;
pub mod registry;
pub mod state;
pub mod traits;
pub mod transmitter;

pub use config::LinkConfig;
pub use engine::{DeviceInfo, Engine, EngineError, LinkStatus};
pub use registry::{ParameterRegistry, ParameterUpdate, RegistryError};
pub use state::{Event, State};
pub use traits::ParameterObserver;
