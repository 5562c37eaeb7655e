//! Error types for the command line front end

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tflash_core::layout::LayoutError;

/// Errors reported by tflash commands
#[derive(Debug, Error)]
pub enum CliError {
    /// Target description could not be loaded
    #[error("Failed to load target description '{}': {source}", .path.display())]
    Layout {
        path: PathBuf,
        #[source]
        source: LayoutError,
    },

    /// File access failed
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Flash image does not match the target
    #[error("Image '{}' holds {len} bytes but the target spans only {span} bytes", .path.display())]
    ImageSize { path: PathBuf, len: usize, span: u32 },

    /// Input does not fit the 32-bit address space
    #[error("Input is too large: {0} bytes")]
    InputTooLarge(usize),

    /// Flash engine reported a failure
    #[error("Flash operation failed: {0}")]
    Flash(#[from] tflash_core::Error),
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
