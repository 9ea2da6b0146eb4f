//! Configuration types
//!
//! Board-agnostic link configuration. The firmware fills it in from a
//! build-time validated TOML file; host tests use the defaults.

pub mod types;

pub use types::*;
