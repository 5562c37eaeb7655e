//! Erase command implementation

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::TargetArgs;
use crate::commands::Session;
use crate::error::CliError;

/// Erase the blocks covering `start..start + length`
pub fn run(args: &TargetArgs, start: u32, length: u32) -> Result<(), CliError> {
    let mut session = Session::open(&args.target, &args.image)?;

    let pb = erase_spinner(start, length);
    let erased = session.target.erase(start, length);
    let completed = session.complete();
    session.save()?;

    match erased.map_err(CliError::from).and(completed) {
        Ok(()) => {
            pb.finish_with_message(format!("Erased 0x{:08X} (+{:#x})", start, length));
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Erase failed");
            Err(e)
        }
    }
}

/// Spinner shown while blocks are erased
pub fn erase_spinner(start: u32, length: u32) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Erasing 0x{:08X} (+{:#x})...", start, length));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
