//! KDK Link Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction the link engine is written
//! against. Chip-specific code (the RP2040 firmware, a host-side test
//! double) implements these traits so the same engine runs everywhere.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  kdk-core (engine, registry, FSM)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  kdk-hal (this crate - traits)          │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ kdk-firmware  │       │ scripted test │
//! │ buffered UART │       │    device     │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`serial::SerialPort`] - Non-blocking byte source and sink

#![no_std]
#![deny(unsafe_code)]

pub mod serial;

pub use serial::{DataBits, Parity, SerialConfig, SerialPort, StopBits};
