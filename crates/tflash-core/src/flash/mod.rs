//! Buffered flash programming engine
//!
//! A [`Target`] owns an ordered list of [`FlashRegion`]s. Each region has its
//! own geometry and a [`RegionDriver`] that talks to the hardware; the target
//! itself has a [`TargetControl`] that enters and leaves flash mode.
//!
//! ```text
//!   erase / write / complete
//!            │
//!            ▼
//!   ┌─────────────────┐   region_for()   ┌──────────────────┐
//!   │    dispatcher   │ ───────────────▶ │ region registry  │
//!   │ (operations.rs) │                  │   (target.rs)    │
//!   └─────────────────┘                  └──────────────────┘
//!            │ prepare / done / enter / exit
//!            ▼
//!   ┌─────────────────┐   flush()        ┌──────────────────┐
//!   │    lifecycle    │ ◀─────────────── │  write buffers   │
//!   │ (lifecycle.rs)  │                  │   (buffer.rs)    │
//!   └─────────────────┘                  └──────────────────┘
//!            │
//!            ▼
//!      RegionDriver / TargetControl (device specific)
//! ```

mod buffer;
mod driver;
mod lifecycle;
mod operations;
mod region;
mod status;
mod target;

pub use driver::{RegionDriver, TargetControl};
pub use region::{FlashRegion, RegionGeometry, DEFAULT_ERASED_VALUE};
pub use target::Target;
