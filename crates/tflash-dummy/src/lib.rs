//! tflash-dummy - In-memory flash emulator for testing
//!
//! This crate builds a [`Target`] from a target description whose regions
//! are backed by memory instead of hardware. It's useful for testing and
//! development without a debug probe attached.
//!
//! The emulator behaves like a strict flash controller: it refuses erase and
//! program operations issued outside flash mode, against a region that was
//! not prepared, or that break the region's alignment rules. Every hook call
//! is recorded so tests can check the exact sequence the engine produced.

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use tflash_core::error::{Error, Result};
use tflash_core::flash::{RegionDriver, RegionGeometry, Target, TargetControl};
use tflash_core::layout::TargetLayout;

bitflags! {
    /// Hooks that should fail on their next invocations
    ///
    /// A set flag stays set until cleared with [`DummyFlash::set_faults`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Faults: u8 {
        /// Fail entering flash mode
        const ENTER   = 1 << 0;
        /// Fail leaving flash mode
        const EXIT    = 1 << 1;
        /// Fail target reset
        const RESET   = 1 << 2;
        /// Fail region prepare
        const PREPARE = 1 << 3;
        /// Fail region done
        const DONE    = 1 << 4;
        /// Fail block erase
        const ERASE   = 1 << 5;
        /// Fail chunk program
        const WRITE   = 1 << 6;
    }
}

/// A hook invocation seen by the emulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyOp {
    /// Target entered flash mode
    EnterFlashMode,
    /// Target left flash mode
    ExitFlashMode,
    /// Target reset
    Reset,
    /// Region prepared, identified by its start address
    Prepare(u32),
    /// Region finished, identified by its start address
    Done(u32),
    /// Block erase
    Erase {
        /// Block address
        addr: u32,
        /// Erase length
        len: u32,
    },
    /// Chunk program
    Write {
        /// Chunk address
        addr: u32,
        /// Programmed bytes
        data: Vec<u8>,
    },
}

/// Configuration for the emulated target
#[derive(Debug, Clone, Default)]
pub struct DummyConfig {
    /// Only provide a reset hook
    ///
    /// Such a target has no notion of flash mode: its flash is always
    /// programmable, and the engine falls back to resetting it when a flash
    /// session starts and ends.
    pub reset_only: bool,
}

/// Memory backing one region
struct RegionMemory {
    geometry: RegionGeometry,
    data: Vec<u8>,
    erase_count: u32,
}

impl RegionMemory {
    fn offset(&self, addr: u32) -> usize {
        (addr - self.geometry.start) as usize
    }
}

struct DummyState {
    regions: Vec<RegionMemory>,
    requires_flash_mode: bool,
    flash_mode: bool,
    prepared: Vec<u32>,
    ops: Vec<DummyOp>,
    faults: Faults,
}

impl DummyState {
    fn record(&mut self, op: DummyOp) {
        log::trace!("dummy: {:?}", op);
        self.ops.push(op);
    }

    fn check_fault(&self, fault: Faults) -> Result<()> {
        if self.faults.contains(fault) {
            log::debug!("dummy: injected {:?} fault", fault);
            return Err(Error::HardwareFault);
        }
        Ok(())
    }

    fn region_mut(&mut self, start: u32) -> Option<&mut RegionMemory> {
        self.regions.iter_mut().find(|r| r.geometry.start == start)
    }

    fn find_byte(&self, addr: u32) -> Option<u8> {
        self.regions
            .iter()
            .find(|r| r.geometry.contains(addr))
            .map(|r| r.data[r.offset(addr)])
    }

    /// Check that hardware access to a region is currently allowed
    fn check_access(&self, region: &RegionGeometry) -> Result<()> {
        if self.requires_flash_mode && !self.flash_mode {
            log::debug!("dummy: access to 0x{:08X} outside flash mode", region.start);
            return Err(Error::HardwareFault);
        }
        if !self.prepared.contains(&region.start) {
            log::debug!("dummy: access to unprepared region 0x{:08X}", region.start);
            return Err(Error::HardwareFault);
        }
        Ok(())
    }
}

/// Program one byte the way flash cells behave
///
/// Bits can only move away from the erased state: 0xFF-erased flash clears
/// bits, 0x00-erased flash sets them. Other erased values have no such rule.
fn program_byte(erased: u8, cell: &mut u8, value: u8) {
    *cell = match erased {
        0xFF => *cell & value,
        0x00 => *cell | value,
        _ => value,
    };
}

/// Target control hooks with flash mode handling
struct DummyControl {
    state: Rc<RefCell<DummyState>>,
}

impl TargetControl for DummyControl {
    fn reset(&mut self) -> Result<()> {
        reset(&self.state)
    }

    fn enter_flash_mode(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(DummyOp::EnterFlashMode);
        state.check_fault(Faults::ENTER)?;
        state.flash_mode = true;
        Ok(())
    }

    fn exit_flash_mode(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(DummyOp::ExitFlashMode);
        state.flash_mode = false;
        state.prepared.clear();
        state.check_fault(Faults::EXIT)
    }
}

/// Target control hooks of a target that can only be reset
struct ResetOnlyControl {
    state: Rc<RefCell<DummyState>>,
}

impl TargetControl for ResetOnlyControl {
    fn reset(&mut self) -> Result<()> {
        reset(&self.state)
    }
}

fn reset(state: &Rc<RefCell<DummyState>>) -> Result<()> {
    let mut state = state.borrow_mut();
    state.record(DummyOp::Reset);
    state.flash_mode = false;
    state.prepared.clear();
    state.check_fault(Faults::RESET)
}

/// Region driver operating on emulated memory
struct DummyRegionDriver {
    state: Rc<RefCell<DummyState>>,
}

impl RegionDriver for DummyRegionDriver {
    fn prepare(&mut self, region: &RegionGeometry) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(DummyOp::Prepare(region.start));
        state.check_fault(Faults::PREPARE)?;
        if state.requires_flash_mode && !state.flash_mode {
            return Err(Error::HardwareFault);
        }
        if !state.prepared.contains(&region.start) {
            state.prepared.push(region.start);
        }
        Ok(())
    }

    fn erase(&mut self, region: &RegionGeometry, addr: u32, len: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(DummyOp::Erase { addr, len });
        state.check_fault(Faults::ERASE)?;
        state.check_access(region)?;

        if addr % region.blocksize != 0 || len != region.blocksize {
            log::debug!("dummy: misaligned erase 0x{:08X}+{:#x}", addr, len);
            return Err(Error::HardwareFault);
        }
        if !region.contains(addr) {
            return Err(Error::AddressOutOfRange { addr });
        }

        let memory = state.region_mut(region.start).ok_or(Error::HardwareFault)?;
        let offset = memory.offset(addr);
        let erased = memory.geometry.erased;
        memory.data[offset..offset + len as usize].fill(erased);
        memory.erase_count += 1;
        Ok(())
    }

    fn write(&mut self, region: &RegionGeometry, addr: u32, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(DummyOp::Write {
            addr,
            data: data.to_vec(),
        });
        state.check_fault(Faults::WRITE)?;
        state.check_access(region)?;

        if addr % region.writesize != 0 || data.len() != region.writesize as usize {
            log::debug!("dummy: misaligned write 0x{:08X}+{:#x}", addr, data.len());
            return Err(Error::HardwareFault);
        }
        if !region.contains(addr) {
            return Err(Error::AddressOutOfRange { addr });
        }

        let memory = state.region_mut(region.start).ok_or(Error::HardwareFault)?;
        let offset = memory.offset(addr);
        let erased = memory.geometry.erased;
        for (cell, &value) in memory.data[offset..offset + data.len()]
            .iter_mut()
            .zip(data)
        {
            program_byte(erased, cell, value);
        }
        Ok(())
    }

    fn done(&mut self, region: &RegionGeometry) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.record(DummyOp::Done(region.start));
        state.prepared.retain(|&start| start != region.start);
        state.check_fault(Faults::DONE)
    }
}

/// Handle to the memory and hook log of an emulated target
///
/// The handle shares its state with the drivers of the [`Target`] it was
/// created with; everything the engine does through the target is visible
/// here.
pub struct DummyFlash {
    state: Rc<RefCell<DummyState>>,
    span: (u32, u32),
}

impl DummyFlash {
    /// Build an emulated target from a description
    ///
    /// Every region starts out fully erased.
    pub fn attach(layout: &TargetLayout, config: DummyConfig) -> Result<(Target, Self)> {
        let span = layout.span().ok_or(Error::NoRegions)?;

        let mut regions = Vec::with_capacity(layout.len());
        for region in &layout.regions {
            let geometry = region.geometry;
            regions.push(RegionMemory {
                geometry,
                data: allocate(geometry.length as usize, geometry.erased)?,
                erase_count: 0,
            });
        }

        let state = Rc::new(RefCell::new(DummyState {
            regions,
            requires_flash_mode: !config.reset_only,
            flash_mode: false,
            prepared: Vec::new(),
            ops: Vec::new(),
            faults: Faults::empty(),
        }));

        let control: Box<dyn TargetControl> = if config.reset_only {
            Box::new(ResetOnlyControl {
                state: Rc::clone(&state),
            })
        } else {
            Box::new(DummyControl {
                state: Rc::clone(&state),
            })
        };

        let target = layout.build_target(control, |_| {
            Box::new(DummyRegionDriver {
                state: Rc::clone(&state),
            })
        })?;

        log::debug!(
            "dummy: emulating {} region(s) over 0x{:08X}..0x{:08X}",
            layout.len(),
            span.0,
            span.1
        );
        Ok((target, Self { state, span }))
    }

    /// Address span covered by all regions, as `(start, end)` with `end` exclusive
    pub fn span(&self) -> (u32, u32) {
        self.span
    }

    /// Read emulated memory
    ///
    /// Every byte must lie inside a region.
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let state = self.state.borrow();
        for (i, byte) in buf.iter_mut().enumerate() {
            let at = addr
                .checked_add(i as u32)
                .ok_or(Error::AddressOutOfRange { addr })?;
            *byte = state
                .find_byte(at)
                .ok_or(Error::AddressOutOfRange { addr: at })?;
        }
        Ok(())
    }

    /// Replace memory contents with an image of the whole span
    ///
    /// Byte `i` of the image lands at `span().0 + i`. Bytes falling between
    /// regions are ignored; a short image leaves the remaining memory as is.
    pub fn load_image(&self, image: &[u8]) -> Result<()> {
        let (start, end) = self.span;
        if image.len() > (end - start) as usize {
            return Err(Error::AddressOutOfRange {
                addr: start.saturating_add(image.len() as u32),
            });
        }

        let mut state = self.state.borrow_mut();
        for memory in &mut state.regions {
            let from = (memory.geometry.start - start) as usize;
            if from >= image.len() {
                continue;
            }
            let to = (from + memory.data.len()).min(image.len());
            memory.data[..to - from].copy_from_slice(&image[from..to]);
        }
        Ok(())
    }

    /// Produce an image of the whole span
    ///
    /// Gaps between regions read as 0xFF.
    pub fn dump_image(&self) -> Result<Vec<u8>> {
        let (start, end) = self.span;
        let mut image = allocate((end - start) as usize, 0xFF)?;

        let state = self.state.borrow();
        for memory in &state.regions {
            let from = (memory.geometry.start - start) as usize;
            image[from..from + memory.data.len()].copy_from_slice(&memory.data);
        }
        Ok(image)
    }

    /// Number of block erases performed on the region starting at `start`
    pub fn erase_count(&self, start: u32) -> Option<u32> {
        self.state
            .borrow()
            .regions
            .iter()
            .find(|r| r.geometry.start == start)
            .map(|r| r.erase_count)
    }

    /// Hook invocations so far, oldest first
    pub fn ops(&self) -> Vec<DummyOp> {
        self.state.borrow().ops.clone()
    }

    /// Forget the recorded hook invocations
    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    /// Select which hooks fail
    pub fn set_faults(&self, faults: Faults) {
        self.state.borrow_mut().faults = faults;
    }

    /// Check if the emulated target is in flash mode
    pub fn in_flash_mode(&self) -> bool {
        self.state.borrow().flash_mode
    }
}

fn allocate(size: usize, fill: u8) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)
        .map_err(|_| Error::AllocationFailed { size })?;
    data.resize(size, fill);
    Ok(data)
}
