//! Target and flash region registry

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::error::Result;
use crate::flash::driver::{RegionDriver, TargetControl};
use crate::flash::region::{FlashRegion, RegionGeometry};

/// A device whose flash is being programmed
///
/// Owns the target control hooks, the registered flash regions in
/// registration order, and the flash mode state of the current session.
///
/// A target is meant to be driven by one caller at a time; every operation
/// runs to completion before returning.
pub struct Target {
    pub(crate) name: String,
    pub(crate) control: Box<dyn TargetControl>,
    pub(crate) regions: Vec<FlashRegion>,
    pub(crate) flash_mode: bool,
}

impl Target {
    /// Create a target with no flash regions
    pub fn new(name: impl Into<String>, control: impl TargetControl + 'static) -> Self {
        Self::with_boxed_control(name, Box::new(control))
    }

    /// Create a target from already boxed control hooks
    pub fn with_boxed_control(name: impl Into<String>, control: Box<dyn TargetControl>) -> Self {
        Self {
            name: name.into(),
            control,
            regions: Vec::new(),
            flash_mode: false,
        }
    }

    /// Get the target name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a flash region
    ///
    /// The geometry is validated, but overlap with regions already registered
    /// is the caller's responsibility: lookups return the first match in
    /// registration order.
    pub fn add_region(
        &mut self,
        geometry: RegionGeometry,
        driver: impl RegionDriver + 'static,
    ) -> Result<()> {
        self.add_boxed_region(geometry, Box::new(driver))
    }

    /// Register a flash region with an already boxed driver
    pub fn add_boxed_region(
        &mut self,
        geometry: RegionGeometry,
        driver: Box<dyn RegionDriver>,
    ) -> Result<()> {
        geometry.validate()?;
        log::debug!(
            "{}: region 0x{:08X}..0x{:08X} (block {:#x}, write {:#x}, buffer {:#x})",
            self.name,
            geometry.start,
            geometry.end(),
            geometry.blocksize,
            geometry.writesize,
            geometry.writebufsize
        );
        self.regions.push(FlashRegion::new(geometry, driver));
        Ok(())
    }

    /// Get the registered regions in registration order
    pub fn regions(&self) -> impl Iterator<Item = &FlashRegion> {
        self.regions.iter()
    }

    /// Find the region containing an address
    pub fn region_for(&self, addr: u32) -> Option<&FlashRegion> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    pub(crate) fn region_index(&self, addr: u32) -> Option<usize> {
        self.regions.iter().position(|r| r.contains(addr))
    }

    /// Check if a flash session is in progress
    pub fn in_flash_mode(&self) -> bool {
        self.flash_mode
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("regions", &self.regions)
            .field("flash_mode", &self.flash_mode)
            .finish()
    }
}
