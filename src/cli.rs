//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "tflash")]
#[command(author, version, about = "Buffered multi-region flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Emulated target options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Target description file (TOML format)
    #[arg(short, long)]
    pub target: PathBuf,

    /// Flash image holding the emulated flash contents (created erased if missing)
    #[arg(short, long)]
    pub image: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the flash regions of a target
    Regions {
        /// Target description file (TOML format)
        #[arg(short, long)]
        target: PathBuf,

        /// Print the normalized description as TOML instead of a table
        #[arg(long)]
        toml: bool,
    },

    /// Erase the flash blocks covering an address range
    Erase {
        #[command(flatten)]
        target: TargetArgs,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        start: u32,

        /// Length in bytes (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        length: u32,
    },

    /// Write a file to flash
    Write {
        #[command(flatten)]
        target: TargetArgs,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        start: u32,

        /// Input file path
        #[arg(long)]
        input: PathBuf,

        /// Erase the covered blocks before writing
        #[arg(long)]
        erase: bool,
    },
}
