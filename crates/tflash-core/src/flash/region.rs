//! Flash region descriptors

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::error::GeometryError;
use crate::flash::buffer::BufferWindow;
use crate::flash::driver::RegionDriver;

/// Default value flash reads as after erase
pub const DEFAULT_ERASED_VALUE: u8 = 0xFF;

/// Address range and programming granularity of a flash region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionGeometry {
    /// First address of the region
    pub start: u32,
    /// Size of the region in bytes
    pub length: u32,
    /// Erase granularity; every erase covers exactly one block
    pub blocksize: u32,
    /// Program granularity; every hardware write is exactly this size
    pub writesize: u32,
    /// Size of the software buffer used to coalesce writes
    pub writebufsize: u32,
    /// Byte value flash reads as after erase
    pub erased: u8,
}

impl RegionGeometry {
    /// Create a geometry for flash that erases to 0xFF
    pub fn new(start: u32, length: u32, blocksize: u32, writesize: u32, writebufsize: u32) -> Self {
        Self {
            start,
            length,
            blocksize,
            writesize,
            writebufsize,
            erased: DEFAULT_ERASED_VALUE,
        }
    }

    /// Set the erased byte value
    pub fn with_erased(mut self, erased: u8) -> Self {
        self.erased = erased;
        self
    }

    /// First address past the end of the region
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.length)
    }

    /// Check if an address is within this region
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr - self.start < self.length
    }

    /// Check if this region overlaps with another
    pub fn overlaps(&self, other: &RegionGeometry) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// Check that the engine can drive this geometry
    ///
    /// All alignment is done with power-of-two masks, and neither an erase
    /// block nor a buffer window may straddle the region boundary.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.length == 0 {
            return Err(GeometryError::EmptyRegion);
        }
        if self.start.checked_add(self.length).is_none() {
            return Err(GeometryError::AddressOverflow);
        }
        if !self.blocksize.is_power_of_two() {
            return Err(GeometryError::BlockSize(self.blocksize));
        }
        if !self.writesize.is_power_of_two() {
            return Err(GeometryError::WriteSize(self.writesize));
        }
        if !self.writebufsize.is_power_of_two() || self.writebufsize < self.writesize {
            return Err(GeometryError::WriteBufferSize(self.writebufsize));
        }
        for alignment in [self.blocksize, self.writebufsize] {
            if self.start % alignment != 0 || self.length % alignment != 0 {
                return Err(GeometryError::Unaligned { alignment });
            }
        }
        Ok(())
    }
}

/// A flash region registered with a target
///
/// Owns the region's driver together with the engine state for it: whether
/// the driver has been prepared, and the write buffer while buffering is in
/// progress.
pub struct FlashRegion {
    pub(crate) geometry: RegionGeometry,
    pub(crate) driver: Box<dyn RegionDriver>,
    pub(crate) ready: bool,
    pub(crate) buffer: Option<Vec<u8>>,
    pub(crate) window: Option<BufferWindow>,
}

impl FlashRegion {
    pub(crate) fn new(geometry: RegionGeometry, driver: Box<dyn RegionDriver>) -> Self {
        Self {
            geometry,
            driver,
            ready: false,
            buffer: None,
            window: None,
        }
    }

    /// Get the region geometry
    pub fn geometry(&self) -> &RegionGeometry {
        &self.geometry
    }

    /// Check if the region has been prepared and not yet finalized
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Check if the region holds buffered data not yet written to flash
    pub fn has_pending_data(&self) -> bool {
        self.window.is_some_and(|w| w.is_pending())
    }

    /// Check if an address is within this region
    pub fn contains(&self, addr: u32) -> bool {
        self.geometry.contains(addr)
    }
}

impl fmt::Debug for FlashRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashRegion")
            .field("geometry", &self.geometry)
            .field("ready", &self.ready)
            .field("buffered", &self.buffer.is_some())
            .field("window", &self.window)
            .finish()
    }
}
