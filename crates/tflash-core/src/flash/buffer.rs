//! Write coalescing
//!
//! Each region stages writes in a buffer of `writebufsize` bytes that mirrors
//! one `writebufsize`-aligned window of flash. The window is pre-filled with
//! the erased value, so bytes the caller never touched program as erased
//! flash. Only the touched part of the window, rounded out to `writesize`
//! chunks, is written when the window is flushed.

use alloc::vec::Vec;
use core::cmp::{max, min};

use crate::error::{Error, Result};
use crate::flash::region::FlashRegion;
use crate::flash::status::Status;

/// The flash window currently mirrored by a region's write buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BufferWindow {
    /// Address of the first buffer byte, aligned to `writebufsize`
    pub(crate) base: u32,
    /// Lowest address written by the caller
    pub(crate) low: u32,
    /// First address past the highest byte written by the caller
    pub(crate) high: u32,
}

impl BufferWindow {
    pub(crate) fn is_pending(&self) -> bool {
        self.low < self.high
    }
}

impl FlashRegion {
    /// Stage `src` for writing at `dest`
    ///
    /// `dest..dest + src.len()` must lie within this region. Data is written
    /// to flash whenever a write moves to a different window, and otherwise
    /// stays buffered until [`FlashRegion::flush`].
    pub(crate) fn buffered_write(&mut self, mut dest: u32, mut src: &[u8]) -> Result<()> {
        if self.buffer.is_none() {
            self.buffer = Some(allocate_buffer(self.geometry.writebufsize as usize)?);
            self.window = None;
        }

        let bufsize = self.geometry.writebufsize;
        let mut status = Status::new();

        while !src.is_empty() {
            let base = dest & !(bufsize - 1);

            if self.window.map(|w| w.base) != Some(base) {
                status.record(self.flush());

                if let Some(buf) = self.buffer.as_mut() {
                    buf.fill(self.geometry.erased);
                }
                self.window = Some(BufferWindow {
                    base,
                    low: dest,
                    high: dest,
                });
            }

            let offset = (dest - base) as usize;
            let chunk_len = min(bufsize as usize - offset, src.len());
            let Some(buf) = self.buffer.as_mut() else {
                break;
            };
            buf[offset..offset + chunk_len].copy_from_slice(&src[..chunk_len]);

            let chunk_end = dest + chunk_len as u32;
            if let Some(window) = self.window.as_mut() {
                window.low = min(window.low, dest);
                window.high = max(window.high, chunk_end);
            }

            dest = chunk_end;
            src = &src[chunk_len..];
        }

        status.into_result()
    }

    /// Write the touched part of the buffered window to flash
    ///
    /// The window is cleared whether or not the hardware accepted the data,
    /// so a failed flush is never retried with stale contents.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let window = match self.window {
            Some(window) if window.is_pending() => window,
            _ => return Ok(()),
        };

        if let Err(e) = self.prepare() {
            self.window = None;
            return Err(e);
        }

        let writesize = self.geometry.writesize;
        let mut addr = window.low & !(writesize - 1);
        let mut remaining = window.high - addr;
        let mut offset = (addr - window.base) as usize;

        log::debug!(
            "region 0x{:08X}: flushing 0x{:08X}..0x{:08X}",
            self.geometry.start,
            addr,
            window.high
        );

        let mut status = Status::new();
        if let Some(buf) = self.buffer.as_deref() {
            while remaining > 0 {
                let chunk = &buf[offset..offset + writesize as usize];
                log::trace!("write 0x{:08X} (+{:#x})", addr, writesize);
                let result = self.driver.write(&self.geometry, addr, chunk).map_err(|e| {
                    log::debug!("write hook at 0x{:08X}: {}", addr, e);
                    Error::WriteFailed { addr }
                });
                status.record(result);

                addr += writesize;
                offset += writesize as usize;
                remaining -= min(remaining, writesize);
            }
        }

        self.window = None;
        status.into_result()
    }
}

/// Allocate a write buffer, reporting heap exhaustion instead of aborting
fn allocate_buffer(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if buf.try_reserve_exact(size).is_err() {
        log::warn!("failed to allocate {} byte write buffer", size);
        return Err(Error::AllocationFailed { size });
    }
    buf.resize(size, 0);
    Ok(buf)
}
