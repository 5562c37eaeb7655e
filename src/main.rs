//! tflash - Buffered multi-region flash programming
//!
//! Drives the tflash flash engine against an emulated target. The target's
//! flash regions come from a TOML description, and its flash contents live in
//! an image file, so erase and write sessions can be replayed and inspected
//! without hardware.
//!
//! # Architecture
//!
//! - `tflash-core` holds the engine: region registry, write buffering,
//!   flash mode and region lifecycle, error aggregation
//! - `tflash-dummy` provides in-memory region drivers and target control
//! - this binary parses the command line, loads and saves the image and
//!   reports progress

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger, verbosity raises the default level
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Regions { target, toml } => commands::regions::run(&target, toml)?,
        Commands::Erase {
            target,
            start,
            length,
        } => commands::erase::run(&target, start, length)?,
        Commands::Write {
            target,
            start,
            input,
            erase,
        } => commands::write::run(&target, start, &input, erase)?,
    }

    Ok(())
}
