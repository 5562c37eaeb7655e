//! Target descriptions
//!
//! A target description names a target and lists its flash regions with
//! their geometry. Descriptions can be:
//!
//! - Built in code
//! - Loaded from TOML files (`std` feature)
//!
//! and turned into a [`Target`](crate::flash::Target) by pairing every
//! region with a driver:
//!
//! ```ignore
//! let layout = TargetLayout::from_toml_file("board.toml")?;
//! let target = layout.build_target(Box::new(control), |region| {
//!     Box::new(MyDriver::new(region))
//! })?;
//! ```

mod types;

#[cfg(feature = "std")]
mod toml;

pub use types::*;
