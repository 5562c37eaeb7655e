//! Driver trait definitions
//!
//! These are the device-specific hooks the engine drives. Only the hardware
//! erase and program operations are mandatory for a region; the lifecycle
//! hooks default to doing nothing.

use crate::error::Result;
use crate::flash::region::RegionGeometry;

/// Programming routines for one flash region
///
/// The engine guarantees that every call it makes is aligned to the region's
/// geometry:
///
/// - `erase` always receives a block-aligned address and exactly `blocksize`
/// - `write` always receives a `writesize`-aligned address and exactly
///   `writesize` bytes
///
/// and that both are only issued between a successful `prepare` and the
/// following `done`, while the target is in flash mode.
///
/// # Example
///
/// ```ignore
/// struct Stm32Flash { regs: FlashRegs }
///
/// impl RegionDriver for Stm32Flash {
///     fn prepare(&mut self, _region: &RegionGeometry) -> Result<()> {
///         self.regs.unlock()
///     }
///
///     fn erase(&mut self, region: &RegionGeometry, addr: u32, _len: u32) -> Result<()> {
///         self.regs.erase_page((addr - region.start) / region.blocksize)
///     }
///
///     fn write(&mut self, _region: &RegionGeometry, addr: u32, data: &[u8]) -> Result<()> {
///         self.regs.program_word(addr, u32::from_le_bytes(data.try_into().unwrap()))
///     }
///
///     fn done(&mut self, _region: &RegionGeometry) -> Result<()> {
///         self.regs.lock()
///     }
/// }
/// ```
pub trait RegionDriver {
    /// Erase one block starting at `addr`
    fn erase(&mut self, region: &RegionGeometry, addr: u32, len: u32) -> Result<()>;

    /// Program one write-granularity chunk starting at `addr`
    fn write(&mut self, region: &RegionGeometry, addr: u32, data: &[u8]) -> Result<()>;

    /// Get the region ready for erase/program operations
    fn prepare(&mut self, _region: &RegionGeometry) -> Result<()> {
        Ok(())
    }

    /// Finish a run of operations against the region
    ///
    /// Called once per successful `prepare`. The engine tears its own state
    /// down whatever this returns.
    fn done(&mut self, _region: &RegionGeometry) -> Result<()> {
        Ok(())
    }
}

/// Target-wide control hooks
///
/// Targets without dedicated flash mode handling only implement `reset`; the
/// engine then resets the target when a flash session starts and when it
/// ends, which leaves the device in a known state even if it was interrupted
/// mid-operation.
pub trait TargetControl {
    /// Fully reset the target
    fn reset(&mut self) -> Result<()>;

    /// Put the target into a state where its flash may be programmed
    fn enter_flash_mode(&mut self) -> Result<()> {
        self.reset()
    }

    /// Return the target to normal operation after programming
    fn exit_flash_mode(&mut self) -> Result<()> {
        self.reset()
    }
}
