//! tflash-core - Buffered flash programming core
//!
//! This crate turns arbitrary, unaligned erase and write requests against a
//! target's non-volatile memory into correctly ordered, hardware-aligned
//! erase and program operations. A target owns one or more flash regions,
//! each with its own geometry and device-specific driver.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`), target
//!   description files in TOML format
//! - `alloc` - Required for the flash engine itself (regions own heap buffers)
//!
//! # Example
//!
//! ```ignore
//! use tflash_core::flash::{RegionGeometry, Target};
//!
//! let mut target = Target::new("board", control);
//! target.add_region(RegionGeometry::new(0x0800_0000, 0x1000, 0x400, 4, 0x100), driver)?;
//!
//! target.erase(0x0800_0000, 0x400)?;
//! target.write(0x0800_0010, &[0xAA, 0xBB, 0xCC])?;
//! target.complete()?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
#[cfg(feature = "alloc")]
pub mod flash;
#[cfg(feature = "alloc")]
pub mod layout;

pub use error::{Error, Result};
