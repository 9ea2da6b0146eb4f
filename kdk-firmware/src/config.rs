//! Build-time configuration
//!
//! `build.rs` validates link.toml and generates the constants below.

use kdk_core::LinkConfig;
use kdk_drivers::WhitePoints;

include!(concat!(env!("OUT_DIR"), "/link_config.rs"));
