//! Public erase, write and complete operations
//!
//! Requests are split at region boundaries and handed to one region at a
//! time. Before a region is used, every other region is flushed and
//! finalized, so at most one region is ever prepared. Failures are recorded
//! and processing continues; only an unmapped address or a failure to enter
//! flash mode stops an operation early.

use core::cmp::min;

use crate::error::{Error, Result};
use crate::flash::status::Status;
use crate::flash::target::Target;

impl Target {
    /// Erase the flash blocks covering `addr..addr + len`
    ///
    /// Erase works on whole blocks, so bytes outside the requested range but
    /// inside a touched block are erased too. Enters flash mode if needed and
    /// leaves it active; call [`Target::complete`] when done programming.
    ///
    /// # Errors
    /// * `ModeEntryFailed` - Flash mode could not be entered, nothing was erased
    /// * `AddressOutOfRange` - Part of the range is not mapped to a region;
    ///   blocks before it have been erased
    /// * `EraseFailed`, `PrepareFailed`, `FinalizeFailed` - First failure of
    ///   a step; the remaining blocks were still processed
    pub fn erase(&mut self, addr: u32, len: u32) -> Result<()> {
        self.enter_flash_mode()?;

        let mut status = Status::new();
        let mut addr = addr;
        let mut remaining = len;

        while remaining > 0 {
            let Some(index) = self.region_index(addr) else {
                log::warn!(
                    "{}: erase address 0x{:08X} is outside every flash region",
                    self.name,
                    addr
                );
                return Err(Error::AddressOutOfRange { addr });
            };

            self.finalize_other_regions(index, &mut status);

            let region = &mut self.regions[index];
            let blocksize = region.geometry.blocksize;
            let block_start = addr & !(blocksize - 1);
            let block_end = block_start + blocksize;

            // Earlier buffered writes land before the erase, as issued
            status.record(region.flush());

            if status.record(region.prepare()) {
                log::trace!("erase 0x{:08X} (+{:#x})", block_start, blocksize);
                let result = region
                    .driver
                    .erase(&region.geometry, block_start, blocksize)
                    .map_err(|e| {
                        log::debug!("erase hook at 0x{:08X}: {}", block_start, e);
                        Error::EraseFailed { addr: block_start }
                    });
                status.record(result);
            }

            remaining -= min(block_end - addr, remaining);
            addr = block_end;

            if remaining == 0 {
                status.record(region.done());
            }
        }

        status.into_result()
    }

    /// Write `data` to flash starting at `dest`
    ///
    /// Data is staged in per-region write buffers and programmed in aligned
    /// write-granularity chunks. Buffered data stays valid across calls as
    /// long as no other region is used in between, so a long image can be
    /// written with many small calls. Data is only guaranteed to be in flash
    /// after [`Target::complete`].
    ///
    /// # Errors
    /// * `ModeEntryFailed` - Flash mode could not be entered, nothing was written
    /// * `AddressOutOfRange` - Part of the range is not mapped to a region
    /// * `WriteFailed`, `PrepareFailed`, `FinalizeFailed`, `AllocationFailed` -
    ///   First failure of a step; the remaining data was still processed
    pub fn write(&mut self, dest: u32, data: &[u8]) -> Result<()> {
        self.enter_flash_mode()?;

        let mut status = Status::new();
        let mut dest = dest;
        let mut data = data;

        while !data.is_empty() {
            let Some(index) = self.region_index(dest) else {
                log::warn!(
                    "{}: write address 0x{:08X} is outside every flash region",
                    self.name,
                    dest
                );
                return Err(Error::AddressOutOfRange { addr: dest });
            };

            self.finalize_other_regions(index, &mut status);

            let region = &mut self.regions[index];
            let region_end = region.geometry.end();
            let local_len = min(data.len(), (region_end - dest) as usize);
            let (chunk, rest) = data.split_at(local_len);

            status.record(region.buffered_write(dest, chunk));

            dest += local_len as u32;
            data = rest;

            // Nothing more can be buffered for this region in this call
            if dest == region_end {
                status.record(region.flush());
                status.record(region.done());
            }
        }

        status.into_result()
    }

    /// Flush all buffered data, finalize every region and leave flash mode
    ///
    /// Flash mode is left even when flushing or finalizing fails.
    ///
    /// # Errors
    /// * `NotInFlashMode` - No erase or write started a session; nothing is done
    /// * Otherwise the first failure among the flushes, finalizations and the
    ///   flash mode exit
    pub fn complete(&mut self) -> Result<()> {
        if !self.flash_mode {
            log::warn!("{}: complete called outside a flash session", self.name);
            return Err(Error::NotInFlashMode);
        }

        let mut status = Status::new();
        for region in &mut self.regions {
            status.record(region.flush());
            status.record(region.done());
        }
        status.record(self.exit_flash_mode());

        if status.is_ok() {
            log::debug!("{}: flash session complete", self.name);
        }
        status.into_result()
    }

    /// Flush and finalize every region except the one at `keep`
    fn finalize_other_regions(&mut self, keep: usize, status: &mut Status) {
        for (index, region) in self.regions.iter_mut().enumerate() {
            if index == keep {
                continue;
            }
            status.record(region.flush());
            status.record(region.done());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::{RegionDriver, RegionGeometry, TargetControl};
    use alloc::collections::BTreeMap;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    /// A hook invocation recorded by the mocks
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Enter,
        Exit,
        Reset,
        Prepare(u32),
        Done(u32),
        Erase(u32, u32),
        Write(u32, Vec<u8>),
    }

    #[derive(Debug, Default, Clone, Copy)]
    struct Faults {
        enter: bool,
        exit: bool,
        prepare: bool,
        done: bool,
        erase: bool,
        write: bool,
    }

    /// State shared between the test and the mock hooks
    #[derive(Clone, Default)]
    struct Harness {
        calls: Rc<RefCell<Vec<Call>>>,
        memory: Rc<RefCell<BTreeMap<u32, u8>>>,
        faults: Rc<RefCell<Faults>>,
    }

    impl Harness {
        fn push(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }

        fn faults(&self) -> Faults {
            *self.faults.borrow()
        }

        fn set_faults(&self, faults: Faults) {
            *self.faults.borrow_mut() = faults;
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn clear(&self) {
            self.calls.borrow_mut().clear();
        }

        fn erases(&self) -> Vec<(u32, u32)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Erase(addr, len) => Some((addr, len)),
                    _ => None,
                })
                .collect()
        }

        fn writes(&self) -> Vec<(u32, Vec<u8>)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Write(addr, data) => Some((addr, data)),
                    _ => None,
                })
                .collect()
        }

        fn count(&self, call: &Call) -> usize {
            self.calls().iter().filter(|c| *c == call).count()
        }

        fn position(&self, call: &Call) -> Option<usize> {
            self.calls().iter().position(|c| c == call)
        }

        /// Read memory as written by the mock; untouched bytes read as 0xFF
        fn read(&self, addr: u32, len: usize) -> Vec<u8> {
            let memory = self.memory.borrow();
            (0..len as u32)
                .map(|i| *memory.get(&(addr + i)).unwrap_or(&0xFF))
                .collect()
        }
    }

    struct MockControl {
        harness: Harness,
    }

    impl TargetControl for MockControl {
        fn reset(&mut self) -> Result<()> {
            self.harness.push(Call::Reset);
            Ok(())
        }

        fn enter_flash_mode(&mut self) -> Result<()> {
            self.harness.push(Call::Enter);
            if self.harness.faults().enter {
                return Err(Error::HardwareFault);
            }
            Ok(())
        }

        fn exit_flash_mode(&mut self) -> Result<()> {
            self.harness.push(Call::Exit);
            if self.harness.faults().exit {
                return Err(Error::HardwareFault);
            }
            Ok(())
        }
    }

    /// Control hooks relying on the default reset fallback
    struct ResetOnly {
        harness: Harness,
    }

    impl TargetControl for ResetOnly {
        fn reset(&mut self) -> Result<()> {
            self.harness.push(Call::Reset);
            Ok(())
        }
    }

    struct MockDriver {
        harness: Harness,
    }

    impl RegionDriver for MockDriver {
        fn erase(&mut self, region: &RegionGeometry, addr: u32, len: u32) -> Result<()> {
            self.harness.push(Call::Erase(addr, len));
            if self.harness.faults().erase {
                return Err(Error::HardwareFault);
            }
            let mut memory = self.harness.memory.borrow_mut();
            for a in addr..addr + len {
                memory.insert(a, region.erased);
            }
            Ok(())
        }

        fn write(&mut self, _region: &RegionGeometry, addr: u32, data: &[u8]) -> Result<()> {
            self.harness.push(Call::Write(addr, data.to_vec()));
            if self.harness.faults().write {
                return Err(Error::HardwareFault);
            }
            let mut memory = self.harness.memory.borrow_mut();
            for (i, &byte) in data.iter().enumerate() {
                memory.insert(addr + i as u32, byte);
            }
            Ok(())
        }

        fn prepare(&mut self, region: &RegionGeometry) -> Result<()> {
            self.harness.push(Call::Prepare(region.start));
            if self.harness.faults().prepare {
                return Err(Error::HardwareFault);
            }
            Ok(())
        }

        fn done(&mut self, region: &RegionGeometry) -> Result<()> {
            self.harness.push(Call::Done(region.start));
            if self.harness.faults().done {
                return Err(Error::HardwareFault);
            }
            Ok(())
        }
    }

    const FLASH: u32 = 0x0800_0000;

    fn single_region() -> RegionGeometry {
        RegionGeometry::new(FLASH, 0x1000, 0x400, 4, 0x100)
    }

    /// Two adjacent regions with different geometry
    fn two_regions() -> [RegionGeometry; 2] {
        [
            RegionGeometry::new(0x0000, 0x1000, 0x400, 4, 0x100),
            RegionGeometry::new(0x1000, 0x1000, 0x800, 8, 0x200),
        ]
    }

    fn mock_target(regions: &[RegionGeometry]) -> (Target, Harness) {
        let harness = Harness::default();
        let mut target = Target::new(
            "test",
            MockControl {
                harness: harness.clone(),
            },
        );
        for geometry in regions {
            target
                .add_region(
                    *geometry,
                    MockDriver {
                        harness: harness.clone(),
                    },
                )
                .unwrap();
        }
        (target, harness)
    }

    fn assert_aligned(harness: &Harness, regions: &[RegionGeometry]) {
        let region_of = |addr: u32| regions.iter().find(|r| r.contains(addr)).unwrap();
        for (addr, len) in harness.erases() {
            let region = region_of(addr);
            assert_eq!(addr % region.blocksize, 0, "erase at 0x{:08X}", addr);
            assert_eq!(len, region.blocksize, "erase at 0x{:08X}", addr);
        }
        for (addr, data) in harness.writes() {
            let region = region_of(addr);
            assert_eq!(addr % region.writesize, 0, "write at 0x{:08X}", addr);
            assert_eq!(data.len() as u32, region.writesize, "write at 0x{:08X}", addr);
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    // =========================================================================
    // Write path
    // =========================================================================

    #[test]
    fn test_small_write_is_padded_with_erased_value() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.write(FLASH + 0x10, &[0xAA, 0xBB, 0xCC]).unwrap();
        assert!(harness.writes().is_empty());
        target.complete().unwrap();

        assert_eq!(
            harness.calls(),
            vec![
                Call::Enter,
                Call::Prepare(FLASH),
                Call::Write(FLASH + 0x10, vec![0xAA, 0xBB, 0xCC, 0xFF]),
                Call::Done(FLASH),
                Call::Exit,
            ]
        );
        assert!(!target.in_flash_mode());
    }

    #[test]
    fn test_single_byte_write_fills_chunk_with_erased_value() {
        let geometry = RegionGeometry::new(0x2000, 0x1000, 0x400, 8, 0x100).with_erased(0x00);
        let (mut target, harness) = mock_target(&[geometry]);

        target.write(0x2013, &[0x5A]).unwrap();
        target.complete().unwrap();

        assert_eq!(
            harness.writes(),
            vec![(0x2010, vec![0x00, 0x00, 0x00, 0x5A, 0x00, 0x00, 0x00, 0x00])]
        );
    }

    #[test]
    fn test_round_trip_sizes() {
        let geometry = single_region();
        for (offset, len) in [(0x21, 3), (0x40, 4), (0x100, 0x100), (0x3FE, 0x203)] {
            let (mut target, harness) = mock_target(&[geometry]);
            let data = pattern(len);

            target.write(FLASH + offset, &data).unwrap();
            target.complete().unwrap();

            assert_eq!(harness.read(FLASH + offset, len), data, "len {}", len);
            assert_aligned(&harness, &[geometry]);
        }
    }

    #[test]
    fn test_round_trip_across_regions() {
        let regions = two_regions();
        let (mut target, harness) = mock_target(&regions);
        let data = pattern(0x155);

        target.write(0x0F7D, &data).unwrap();
        target.complete().unwrap();

        assert_eq!(harness.read(0x0F7D, data.len()), data);
        assert_aligned(&harness, &regions);
        // Untouched bytes around the request stay erased
        assert_eq!(harness.read(0x0F7C, 1), vec![0xFF]);
        assert_eq!(harness.read(0x0F7D + data.len() as u32, 3), vec![0xFF; 3]);
    }

    #[test]
    fn test_many_small_writes_coalesce() {
        let (mut target, harness) = mock_target(&[single_region()]);

        for (i, byte) in [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]
            .iter()
            .enumerate()
        {
            target.write(FLASH + 0x20 + i as u32, &[*byte]).unwrap();
        }
        assert!(harness.writes().is_empty());
        target.complete().unwrap();

        assert_eq!(
            harness.writes(),
            vec![
                (FLASH + 0x20, vec![0x11, 0x22, 0x33, 0x44]),
                (FLASH + 0x24, vec![0x55, 0x66, 0x77, 0x88]),
            ]
        );
        assert_eq!(harness.count(&Call::Prepare(FLASH)), 1);
        assert_eq!(harness.count(&Call::Done(FLASH)), 1);
    }

    #[test]
    fn test_leaving_window_flushes_previous_window() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.write(FLASH + 0xFE, &[0x01, 0x02, 0x03, 0x04]).unwrap();

        // The first window is written as soon as the write moves past it
        assert_eq!(harness.writes(), vec![(FLASH + 0xFC, vec![0xFF, 0xFF, 0x01, 0x02])]);

        target.complete().unwrap();
        assert_eq!(
            harness.writes(),
            vec![
                (FLASH + 0xFC, vec![0xFF, 0xFF, 0x01, 0x02]),
                (FLASH + 0x100, vec![0x03, 0x04, 0xFF, 0xFF]),
            ]
        );
        assert_eq!(harness.count(&Call::Prepare(FLASH)), 1);
    }

    #[test]
    fn test_only_touched_chunks_are_written() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.write(FLASH + 0x80, &[0x10, 0x20]).unwrap();
        target.write(FLASH + 0x89, &[0x30]).unwrap();
        target.complete().unwrap();

        // 0x80..0x8A rounds out to three chunks; the rest of the window is skipped
        assert_eq!(
            harness.writes(),
            vec![
                (FLASH + 0x80, vec![0x10, 0x20, 0xFF, 0xFF]),
                (FLASH + 0x84, vec![0xFF, 0xFF, 0xFF, 0xFF]),
                (FLASH + 0x88, vec![0xFF, 0x30, 0xFF, 0xFF]),
            ]
        );
    }

    #[test]
    fn test_write_reaching_region_end_finalizes_region() {
        let regions = two_regions();
        let (mut target, harness) = mock_target(&regions);

        target.write(0x0FFC, &[1, 2, 3, 4]).unwrap();

        assert_eq!(
            harness.calls(),
            vec![
                Call::Enter,
                Call::Prepare(0x0000),
                Call::Write(0x0FFC, vec![1, 2, 3, 4]),
                Call::Done(0x0000),
            ]
        );
        assert!(!target.regions().any(|r| r.is_ready() || r.has_pending_data()));
        assert!(target.in_flash_mode());
    }

    #[test]
    fn test_switching_region_flushes_previous_region_first() {
        let regions = two_regions();
        let (mut target, harness) = mock_target(&regions);

        target.write(0x0010, &[0xA1, 0xA2]).unwrap();
        assert!(target.region_for(0x0010).unwrap().has_pending_data());

        target.write(0x1010, &[0xB1, 0xB2]).unwrap();
        let flushed_a = harness.position(&Call::Write(0x0010, vec![0xA1, 0xA2, 0xFF, 0xFF]));
        let done_a = harness.position(&Call::Done(0x0000)).unwrap();
        assert!(flushed_a.unwrap() < done_a);
        assert!(!target.region_for(0x0010).unwrap().is_ready());

        target.complete().unwrap();
        let calls = harness.calls();
        let first_b = calls
            .iter()
            .position(|c| matches!(c, Call::Prepare(0x1000) | Call::Write(0x1000.., _)))
            .unwrap();
        assert!(done_a < first_b);
        assert_eq!(
            harness.writes().last().unwrap(),
            &(0x1010, vec![0xB1, 0xB2, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
        );
    }

    #[test]
    fn test_write_to_unmapped_address() {
        let (mut target, harness) = mock_target(&[single_region()]);

        assert_eq!(
            target.write(0x2000_0000, &[1, 2, 3]),
            Err(Error::AddressOutOfRange { addr: 0x2000_0000 })
        );
        assert!(harness.erases().is_empty());
        assert!(harness.writes().is_empty());
    }

    #[test]
    fn test_write_running_off_mapped_flash() {
        let (mut target, harness) = mock_target(&[single_region()]);

        assert_eq!(
            target.write(FLASH + 0xFFE, &[1, 2, 3, 4]),
            Err(Error::AddressOutOfRange { addr: FLASH + 0x1000 })
        );
        // The mapped part was still programmed and the region finalized
        assert_eq!(harness.writes(), vec![(FLASH + 0xFFC, vec![0xFF, 0xFF, 1, 2])]);
        assert!(harness.position(&Call::Done(FLASH)).is_some());
    }

    #[test]
    fn test_write_failures_are_aggregated() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.set_faults(Faults {
            write: true,
            ..Faults::default()
        });

        target.write(FLASH, &pattern(16)).unwrap();
        assert_eq!(target.complete(), Err(Error::WriteFailed { addr: FLASH }));

        // Every chunk was still attempted, and the session is closed
        assert_eq!(harness.writes().len(), 4);
        assert_eq!(harness.count(&Call::Done(FLASH)), 1);
        assert_eq!(harness.count(&Call::Exit), 1);
        assert!(!target.in_flash_mode());
    }

    #[test]
    fn test_prepare_failure_drops_window() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.set_faults(Faults {
            prepare: true,
            ..Faults::default()
        });

        target.write(FLASH + 0x40, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            target.complete(),
            Err(Error::PrepareFailed { region: FLASH })
        );

        assert!(harness.writes().is_empty());
        assert_eq!(harness.count(&Call::Done(FLASH)), 0);
        let region = target.region_for(FLASH).unwrap();
        assert!(!region.is_ready());
        assert!(!region.has_pending_data());
        assert!(!target.in_flash_mode());
    }

    #[test]
    fn test_prepare_failure_releases_buffer_at_complete() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.set_faults(Faults {
            prepare: true,
            ..Faults::default()
        });

        target.write(FLASH + 0x10, &[1, 2, 3]).unwrap();
        assert!(target.region_for(FLASH).unwrap().buffer.is_some());
        assert_eq!(
            target.complete(),
            Err(Error::PrepareFailed { region: FLASH })
        );

        let region = target.region_for(FLASH).unwrap();
        assert!(region.buffer.is_none());
        assert!(region.window.is_none());
        assert!(!region.is_ready());
        assert_eq!(harness.count(&Call::Done(FLASH)), 0);
    }

    // =========================================================================
    // Erase path
    // =========================================================================

    #[test]
    fn test_partial_erase_covers_whole_block() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.erase(FLASH + 5, 0x10).unwrap();

        assert_eq!(
            harness.calls(),
            vec![
                Call::Enter,
                Call::Prepare(FLASH),
                Call::Erase(FLASH, 0x400),
                Call::Done(FLASH),
            ]
        );
        assert!(target.in_flash_mode());
        target.complete().unwrap();
        assert_eq!(harness.count(&Call::Exit), 1);
    }

    #[test]
    fn test_erase_reports_hook_failure() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.set_faults(Faults {
            erase: true,
            ..Faults::default()
        });

        assert_eq!(
            target.erase(FLASH + 5, 0x10),
            Err(Error::EraseFailed { addr: FLASH })
        );
        assert_eq!(harness.erases(), vec![(FLASH, 0x400)]);
        assert_eq!(harness.count(&Call::Done(FLASH)), 1);
    }

    #[test]
    fn test_erase_across_regions() {
        let regions = two_regions();
        let (mut target, harness) = mock_target(&regions);

        target.erase(0x0A00, 0x0C00).unwrap();

        assert_eq!(
            harness.erases(),
            vec![(0x0800, 0x400), (0x0C00, 0x400), (0x1000, 0x800)]
        );
        assert_aligned(&harness, &regions);

        let done_a = harness.position(&Call::Done(0x0000)).unwrap();
        let prepare_b = harness.position(&Call::Prepare(0x1000)).unwrap();
        assert!(done_a < prepare_b);
        assert_eq!(harness.count(&Call::Prepare(0x0000)), 1);
        assert_eq!(harness.count(&Call::Done(0x1000)), 1);
    }

    #[test]
    fn test_erase_running_off_mapped_flash() {
        let regions = two_regions();
        let (mut target, harness) = mock_target(&regions);

        assert_eq!(
            target.erase(0x1800, 0x1000),
            Err(Error::AddressOutOfRange { addr: 0x2000 })
        );
        assert_eq!(harness.erases(), vec![(0x1800, 0x800)]);
    }

    #[test]
    fn test_erase_then_write_round_trip() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.memory.borrow_mut().insert(FLASH + 0x3FF, 0x00);

        let data = pattern(0x20);
        target.erase(FLASH, 0x400).unwrap();
        target.write(FLASH + 0x100, &data).unwrap();
        target.complete().unwrap();

        assert_eq!(harness.read(FLASH + 0x100, data.len()), data);
        assert_eq!(harness.read(FLASH + 0x3FF, 1), vec![0xFF]);
        assert_eq!(harness.count(&Call::Enter), 1);
    }

    #[test]
    fn test_erase_keeps_buffered_data_of_same_region() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.write(FLASH + 0x10, &[1, 2, 3, 4]).unwrap();
        target.erase(FLASH + 0x800, 0x400).unwrap();

        assert_eq!(
            harness.calls(),
            vec![
                Call::Enter,
                Call::Prepare(FLASH),
                Call::Write(FLASH + 0x10, vec![1, 2, 3, 4]),
                Call::Erase(FLASH + 0x800, 0x400),
                Call::Done(FLASH),
            ]
        );
        target.complete().unwrap();
        assert_eq!(harness.read(FLASH + 0x10, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_finalize_failure_still_clears_ready() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.set_faults(Faults {
            done: true,
            ..Faults::default()
        });

        assert_eq!(
            target.erase(FLASH, 0x400),
            Err(Error::FinalizeFailed { region: FLASH })
        );
        assert!(!target.region_for(FLASH).unwrap().is_ready());

        harness.set_faults(Faults::default());
        target.erase(FLASH + 0x400, 0x400).unwrap();
        assert_eq!(harness.count(&Call::Prepare(FLASH)), 2);
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    #[test]
    fn test_complete_without_session() {
        let (mut target, harness) = mock_target(&[single_region()]);

        assert_eq!(target.complete(), Err(Error::NotInFlashMode));
        assert!(harness.calls().is_empty());
    }

    #[test]
    fn test_complete_twice() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.write(FLASH, &[1, 2, 3, 4]).unwrap();
        target.complete().unwrap();
        harness.clear();

        assert_eq!(target.complete(), Err(Error::NotInFlashMode));
        assert!(harness.calls().is_empty());
    }

    #[test]
    fn test_flash_mode_entered_once_per_session() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.erase(FLASH, 0x400).unwrap();
        target.write(FLASH, &[1, 2, 3, 4]).unwrap();
        target.erase(FLASH + 0x800, 0x400).unwrap();
        target.complete().unwrap();
        target.write(FLASH + 0x10, &[5]).unwrap();
        target.complete().unwrap();

        assert_eq!(harness.count(&Call::Enter), 2);
        assert_eq!(harness.count(&Call::Exit), 2);
    }

    #[test]
    fn test_enter_failure_touches_no_flash() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.set_faults(Faults {
            enter: true,
            ..Faults::default()
        });

        assert_eq!(target.erase(FLASH, 0x400), Err(Error::ModeEntryFailed));
        assert_eq!(target.write(FLASH, &[1]), Err(Error::ModeEntryFailed));
        assert_eq!(harness.calls(), vec![Call::Enter, Call::Enter]);
        assert!(!target.in_flash_mode());
    }

    #[test]
    fn test_exit_failure_still_ends_session() {
        let (mut target, harness) = mock_target(&[single_region()]);
        harness.set_faults(Faults {
            exit: true,
            ..Faults::default()
        });

        target.write(FLASH, &[1, 2, 3, 4]).unwrap();
        assert_eq!(target.complete(), Err(Error::ModeExitFailed));
        assert!(!target.in_flash_mode());
        assert_eq!(harness.writes().len(), 1);
        assert_eq!(target.complete(), Err(Error::NotInFlashMode));
    }

    #[test]
    fn test_reset_fallback_without_mode_hooks() {
        let harness = Harness::default();
        let mut target = Target::new(
            "reset-only",
            ResetOnly {
                harness: harness.clone(),
            },
        );
        target
            .add_region(
                single_region(),
                MockDriver {
                    harness: harness.clone(),
                },
            )
            .unwrap();

        target.write(FLASH, &[1, 2, 3, 4]).unwrap();
        target.complete().unwrap();

        assert_eq!(
            harness.calls(),
            vec![
                Call::Reset,
                Call::Prepare(FLASH),
                Call::Write(FLASH, vec![1, 2, 3, 4]),
                Call::Done(FLASH),
                Call::Reset,
            ]
        );
    }

    #[test]
    fn test_zero_length_requests() {
        let (mut target, harness) = mock_target(&[single_region()]);

        target.erase(FLASH, 0).unwrap();
        target.write(FLASH, &[]).unwrap();
        target.complete().unwrap();

        assert_eq!(harness.calls(), vec![Call::Enter, Call::Exit]);
    }

    // =========================================================================
    // Registry
    // =========================================================================

    #[test]
    fn test_region_lookup() {
        let (target, _harness) = mock_target(&two_regions());

        assert_eq!(target.region_for(0x0000).unwrap().geometry().start, 0x0000);
        assert_eq!(target.region_for(0x0FFF).unwrap().geometry().start, 0x0000);
        assert_eq!(target.region_for(0x1000).unwrap().geometry().start, 0x1000);
        assert!(target.region_for(0x2000).is_none());
        assert_eq!(target.regions().count(), 2);
    }

    #[test]
    fn test_add_region_rejects_invalid_geometry() {
        let (mut target, harness) = mock_target(&[]);
        let geometry = RegionGeometry::new(0x0000, 0x1000, 0x400, 3, 0x100);

        assert_eq!(
            target.add_region(geometry, MockDriver { harness }),
            Err(Error::InvalidGeometry(crate::error::GeometryError::WriteSize(3)))
        );
        assert_eq!(target.regions().count(), 0);
    }
}
