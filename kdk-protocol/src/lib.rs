//! KDK Controller Link Protocol
//!
//! This crate defines the half-duplex UART protocol spoken between the
//! network module and a KDK ceiling fan / light controller. The controller
//! owns the fan and light; the module discovers its parameter table at
//! bring-up and then reads and writes parameters by ID.
//!
//! # Protocol Overview
//!
//! All messages use a single binary frame format:
//! ```text
//! ┌───────┬─────────┬──────────┬──────────┬────────┬─────────────┬──────────┐
//! │ START │ COUNTER │ COMMAND  │ RESERVED │ LENGTH │ PAYLOAD     │ CHECKSUM │
//! │ 1B    │ 1B      │ 2B (LE)  │ 1B       │ 1B     │ 0–250B      │ 1B       │
//! └───────┴─────────┴──────────┴──────────┴────────┴─────────────┴──────────┘
//! ```
//!
//! Bit 15 of COMMAND marks a response, which echoes the request's COUNTER.
//! A single `0x66` byte outside a frame is the controller's resync marker.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

pub mod command;
pub mod frame;
pub mod info;
pub mod messages;
pub mod params;
pub mod receiver;

pub use command::Command;
pub use frame::{Frame, FrameError, FRAME_START, FRAME_SYNC, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
pub use info::InfoRecord;
pub use messages::DeviceRequest;
pub use params::{BlockEntry, ParameterBlock, ParameterTable, Payload, TableEntry, TableId};
pub use receiver::{Received, Receiver, RxState, RxStats};
