//! Regions command implementation

use std::path::Path;

use crate::commands::load_layout;
use crate::error::CliError;

/// List the regions of a target description
///
/// With `toml` set, the validated description is printed in normalized TOML
/// form (sorted, hex addresses, human-readable sizes) instead of a table.
pub fn run(target_file: &Path, toml: bool) -> Result<(), CliError> {
    let layout = load_layout(target_file)?;

    if toml {
        let output = layout.to_toml_string().map_err(|source| CliError::Layout {
            path: target_file.to_path_buf(),
            source,
        })?;
        print!("{}", output);
        return Ok(());
    }

    if let Some(name) = &layout.name {
        println!("Target: {}", name);
    }
    println!(
        "{:<16} {:>10}   {:>10} {:>10} {:>8} {:>8} {:>6}",
        "Name", "Start", "End", "Block", "Write", "Buffer", "Erased"
    );
    println!("{}", "-".repeat(80));

    for region in &layout.regions {
        let g = &region.geometry;
        println!(
            "{:<16} 0x{:08X} - 0x{:08X} {:>10} {:>8} {:>8}   0x{:02X}",
            region.name,
            g.start,
            g.end() - 1,
            format_size(g.blocksize),
            format_size(g.writesize),
            format_size(g.writebufsize),
            g.erased
        );
    }

    Ok(())
}

/// Format a size as human-readable string
fn format_size(size: u32) -> String {
    if size >= 1024 * 1024 && size % (1024 * 1024) == 0 {
        format!("{} MiB", size / (1024 * 1024))
    } else if size >= 1024 && size % 1024 == 0 {
        format!("{} KiB", size / 1024)
    } else {
        format!("{} B", size)
    }
}
