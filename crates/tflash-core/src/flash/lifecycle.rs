//! Flash mode and region readiness state machines
//!
//! Both levels have the same shape: entering is a no-op when already active,
//! and leaving always ends in the inactive state so that a failing hook can
//! never wedge later sessions.

use crate::error::{Error, Result};
use crate::flash::region::FlashRegion;
use crate::flash::target::Target;

impl Target {
    /// Enter flash mode if not already in it
    pub(crate) fn enter_flash_mode(&mut self) -> Result<()> {
        if self.flash_mode {
            return Ok(());
        }

        if let Err(e) = self.control.enter_flash_mode() {
            log::warn!("{}: entering flash mode failed: {}", self.name, e);
            return Err(Error::ModeEntryFailed);
        }

        log::debug!("{}: entered flash mode", self.name);
        self.flash_mode = true;
        Ok(())
    }

    /// Leave flash mode; the session is over even if the hook fails
    pub(crate) fn exit_flash_mode(&mut self) -> Result<()> {
        if !self.flash_mode {
            return Ok(());
        }

        let result = self.control.exit_flash_mode().map_err(|e| {
            log::warn!("{}: exiting flash mode failed: {}", self.name, e);
            Error::ModeExitFailed
        });

        log::debug!("{}: left flash mode", self.name);
        self.flash_mode = false;
        result
    }
}

impl FlashRegion {
    /// Run the prepare hook unless the region is already ready
    pub(crate) fn prepare(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        let region = self.geometry.start;
        self.driver.prepare(&self.geometry).map_err(|e| {
            log::debug!("region 0x{:08X}: prepare hook: {}", region, e);
            Error::PrepareFailed { region }
        })?;

        log::debug!("region 0x{:08X}: ready", region);
        self.ready = true;
        Ok(())
    }

    /// Run the done hook and tear down the region's engine state
    ///
    /// The hook only runs for a ready region, but the write buffer is
    /// released and the region leaves the ready state in every case,
    /// including after a failed prepare. Any data still buffered is
    /// discarded, so callers flush first.
    pub(crate) fn done(&mut self) -> Result<()> {
        self.buffer = None;
        self.window = None;

        if !self.ready {
            return Ok(());
        }

        let region = self.geometry.start;
        let result = self.driver.done(&self.geometry).map_err(|e| {
            log::debug!("region 0x{:08X}: done hook: {}", region, e);
            Error::FinalizeFailed { region }
        });

        self.ready = false;
        log::debug!("region 0x{:08X}: finalized", region);
        result
    }
}
