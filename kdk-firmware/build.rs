//! Build script for kdk-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates link.toml and turns it into Rust constants

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use kdk_core::LinkConfig;
use serde::Deserialize;

/// Layout of link.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LinkFile {
    link: LinkConfig,
    light: LightSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LightSection {
    cold_white_kelvin: u32,
    warm_white_kelvin: u32,
}

impl Default for LightSection {
    fn default() -> Self {
        Self {
            cold_white_kelvin: 6000,
            warm_white_kelvin: 2700,
        }
    }
}

fn main() {
    setup_linker();
    let config = load_config();
    generate_config(&config);
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    if env::var_os("CARGO_FEATURE_DEFMT").is_some() {
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    }
}

/// Read and validate link.toml
fn load_config() -> LinkFile {
    println!("cargo:rerun-if-changed=link.toml");

    let config_path = Path::new("link.toml");
    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: link.toml not found!                                     ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a link.toml in the kdk-firmware           ║\n\
            ║  directory with [link] and [light] sections.                     ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => fail("Failed to read link.toml", &e.to_string()),
    };

    let config: LinkFile = match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => fail("Invalid link.toml", &e.to_string()),
    };

    let mut errors = Vec::new();
    if let Err(e) = config.link.validate() {
        errors.push(format!("[link] {}", e));
    }
    if config.link.max_retries == 0 {
        errors.push("[link] max_retries must be at least 1".to_string());
    }

    let light = &config.light;
    for (name, kelvin) in [
        ("cold_white_kelvin", light.cold_white_kelvin),
        ("warm_white_kelvin", light.warm_white_kelvin),
    ] {
        if !(1000..=10_000).contains(&kelvin) {
            errors.push(format!("[light] {} = {} is outside 1000-10000 K", name, kelvin));
        }
    }
    if light.cold_white_kelvin <= light.warm_white_kelvin {
        errors.push("[light] cold_white_kelvin must be above warm_white_kelvin".to_string());
    }

    if !errors.is_empty() {
        fail("link.toml validation failed", &errors.join("\n"));
    }

    println!("cargo:warning=link.toml validated successfully");
    config
}

/// Write the validated values as constants included by src/config.rs
fn generate_config(config: &LinkFile) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let link = &config.link;
    let light = &config.light;

    let code = format!(
        "/// Link timing from link.toml\n\
         pub const LINK_CONFIG: LinkConfig = LinkConfig {{\n\
         \x20   byte_timeout_ms: {},\n\
         \x20   receive_timeout_ms: {},\n\
         \x20   max_retries: {},\n\
         \x20   poll_interval_ms: {},\n\
         \x20   wait_sync_timeout_ms: {},\n\
         }};\n\
         \n\
         /// Light white points from link.toml\n\
         pub const WHITE_POINTS: WhitePoints = WhitePoints::from_kelvin({}, {});\n",
        link.byte_timeout_ms,
        link.receive_timeout_ms,
        link.max_retries,
        link.poll_interval_ms,
        link.wait_sync_timeout_ms,
        light.cold_white_kelvin,
        light.warm_white_kelvin,
    );

    fs::write(out_dir.join("link_config.rs"), code).unwrap();
}

fn fail(title: &str, detail: &str) -> ! {
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        format_error_lines(detail)
    );
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
