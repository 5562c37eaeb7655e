//! Write command implementation

use std::fs;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tflash_core::flash::Target;

use crate::cli::TargetArgs;
use crate::commands::erase::erase_spinner;
use crate::commands::Session;
use crate::error::CliError;

/// Size of each write request handed to the flash engine
///
/// Smaller than typical write buffers, so consecutive requests are merged
/// by the engine before reaching the hardware.
const WRITE_CHUNK_SIZE: usize = 64;

/// Write `input` to flash starting at `start`
pub fn run(args: &TargetArgs, start: u32, input: &Path, erase: bool) -> Result<(), CliError> {
    let data = fs::read(input).map_err(|e| CliError::io(input, e))?;
    let length = u32::try_from(data.len()).map_err(|_| CliError::InputTooLarge(data.len()))?;
    if data.is_empty() {
        println!("{} is empty, nothing to write", input.display());
        return Ok(());
    }

    let mut session = Session::open(&args.target, &args.image)?;
    let written = program(&mut session.target, start, &data, erase);
    let completed = session.complete();
    session.save()?;

    written?;
    completed?;
    println!(
        "Wrote {} bytes to 0x{:08X}..0x{:08X}",
        length,
        start,
        start.saturating_add(length)
    );
    Ok(())
}

/// Optionally erase, then stream `data` to the target in chunks
fn program(target: &mut Target, start: u32, data: &[u8], erase: bool) -> Result<(), CliError> {
    if erase {
        let length = data.len() as u32;
        let pb = erase_spinner(start, length);
        if let Err(e) = target.erase(start, length) {
            pb.abandon_with_message("Erase failed");
            return Err(e.into());
        }
        pb.finish_with_message("Erase complete");
    }

    let pb = ProgressBar::new(data.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) Writing")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut addr = start;
    for chunk in data.chunks(WRITE_CHUNK_SIZE) {
        if let Err(e) = target.write(addr, chunk) {
            pb.abandon_with_message("Write failed");
            return Err(e.into());
        }
        addr = addr.wrapping_add(chunk.len() as u32);
        pb.inc(chunk.len() as u64);
    }

    pb.finish_with_message("Write complete");
    Ok(())
}
