//! Flash program policy for the update session.
//!
//! Firmware arrives as fixed-size chunks in increasing offset order
//! starting at 0. Erases are issued only when a chunk lands exactly on a
//! sector boundary and that sector still holds stale data, which keeps
//! erase-cycle wear down while guaranteeing a fresh image always lands
//! on blank flash.

use core::time::Duration;

use crate::{BootConfig, FlashDevice, FlashError};

/// Advisory wait budget the transport should allow for one chunk write.
const WRITE_TIMEOUT: Duration = Duration::from_millis(1);

/// Writes the application image region chunk by chunk.
///
/// `CHUNK` is the transfer unit the session delivers. Every call programs
/// the full `CHUNK` bytes even when the request claims fewer are
/// meaningful; padding bytes are written as-is.
pub struct FlashProgrammer<const CHUNK: usize, F: FlashDevice> {
    flash: F,
    config: BootConfig,
}

impl<const CHUNK: usize, F: FlashDevice> FlashProgrammer<CHUNK, F> {
    pub fn new(flash: F, config: BootConfig) -> Self {
        Self { flash, config }
    }

    /// Program one chunk at `offset` (relative to the application image
    /// region base).
    ///
    /// Callers guarantee `offset` is chunk-aligned and offsets arrive in
    /// increasing order from 0; neither is validated here. `length` is
    /// advisory only.
    ///
    /// A failed write is reported once and not retried. Note that the
    /// sector erase, when one was needed, has already happened by then.
    pub fn write(
        &mut self,
        offset: u32,
        data: &[u8; CHUNK],
        _length: u32,
    ) -> Result<(), FlashError> {
        let address = self
            .config
            .app_base
            .checked_add(offset)
            .ok_or(FlashError::OutOfBounds)?;

        let chunk_len = u32::try_from(CHUNK).map_err(|_| FlashError::OutOfBounds)?;
        let write_end = address
            .checked_add(chunk_len)
            .ok_or(FlashError::OutOfBounds)?;
        let region_end = self
            .config
            .app_base
            .checked_add(self.config.app_size)
            .ok_or(FlashError::OutOfBounds)?;
        if write_end > region_end {
            return Err(FlashError::OutOfBounds);
        }

        // The chunk starts a sector iff the whole sector span beginning
        // at `address` stays inside one sector.
        let sector_last = self
            .config
            .sector_size
            .checked_sub(1)
            .and_then(|span| address.checked_add(span))
            .ok_or(FlashError::OutOfBounds)?;
        let start_of_sector = self.flash.sector_of(address) == self.flash.sector_of(sector_last);

        if start_of_sector && !self.flash.is_blank(address, self.config.sector_size)? {
            self.flash.erase_sector(address)?;
        }

        self.flash.write(address, data)
    }

    /// Fixed advisory value; configuration, not a measurement.
    pub fn get_write_timeout(&self) -> Duration {
        WRITE_TIMEOUT
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn into_flash(self) -> F {
        self.flash
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    const CHUNK: usize = 256;
    const SECTOR: u32 = 4096;
    const APP_BASE: u32 = 0x2000;
    const APP_SIZE: u32 = 0x4000;
    const DEVICE_LEN: usize = 0x8000;

    /// In-memory NOR-ish flash: erases flip a sector to 0xFF, writes can
    /// only clear bits, and every erase is recorded by sector base.
    struct RamFlash {
        mem: std::vec::Vec<u8>,
        erases: std::vec::Vec<u32>,
        fail_writes: bool,
    }

    impl RamFlash {
        fn blank() -> Self {
            Self {
                mem: std::vec![0xFF; DEVICE_LEN],
                erases: std::vec::Vec::new(),
                fail_writes: false,
            }
        }

        fn fill(&mut self, address: u32, len: u32, value: u8) {
            let start = address as usize;
            let end = start + len as usize;
            for byte in &mut self.mem[start..end] {
                *byte = value;
            }
        }
    }

    impl FlashDevice for RamFlash {
        fn sector_of(&self, address: u32) -> u32 {
            address / SECTOR
        }

        fn is_blank(&mut self, address: u32, len: u32) -> Result<bool, FlashError> {
            let start = address as usize;
            let end = start + len as usize;
            Ok(self.mem[start..end].iter().all(|&byte| byte == 0xFF))
        }

        fn erase_sector(&mut self, address: u32) -> Result<(), FlashError> {
            let base = address - (address % SECTOR);
            self.erases.push(base);
            self.fill(base, SECTOR, 0xFF);
            Ok(())
        }

        fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
            if self.fail_writes {
                return Err(FlashError::WriteFailed);
            }
            let start = address as usize;
            for (slot, &byte) in self.mem[start..start + data.len()].iter_mut().zip(data) {
                // NOR programming can only clear bits.
                *slot &= byte;
            }
            Ok(())
        }

        fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            let start = address as usize;
            buf.copy_from_slice(&self.mem[start..start + buf.len()]);
            Ok(())
        }
    }

    fn programmer(flash: RamFlash) -> FlashProgrammer<CHUNK, RamFlash> {
        FlashProgrammer::new(flash, BootConfig::new(APP_BASE, APP_SIZE, SECTOR))
    }

    fn chunk(value: u8) -> [u8; CHUNK] {
        [value; CHUNK]
    }

    #[test]
    fn blank_sector_start_writes_without_erase() {
        let mut prog = programmer(RamFlash::blank());
        let data = chunk(0xA5);

        prog.write(0, &data, CHUNK as u32).expect("write");

        assert!(prog.flash.erases.is_empty());
        let mut back = [0u8; CHUNK];
        prog.flash.read(APP_BASE, &mut back).expect("read");
        assert_eq!(back, data);
    }

    #[test]
    fn stale_sector_start_erases_exactly_once() {
        let mut flash = RamFlash::blank();
        flash.fill(APP_BASE, SECTOR, 0x00);
        let mut prog = programmer(flash);
        let data = chunk(0x5A);

        prog.write(0, &data, CHUNK as u32).expect("write");

        assert_eq!(prog.flash.erases, [APP_BASE]);
        let mut back = [0u8; CHUNK];
        prog.flash.read(APP_BASE, &mut back).expect("read");
        assert_eq!(back, data);
    }

    #[test]
    fn interior_offsets_never_erase() {
        let mut prog = programmer(RamFlash::blank());

        // First chunk makes the sector non-blank; the rest of the sector
        // must still be written without an erase.
        prog.write(0, &chunk(0x11), CHUNK as u32).expect("chunk 0");
        let mut offset = CHUNK as u32;
        while offset < SECTOR {
            prog.write(offset, &chunk(0x22), CHUNK as u32).expect("interior chunk");
            offset += CHUNK as u32;
        }

        assert!(prog.flash.erases.is_empty());
        let mut back = [0u8; CHUNK];
        prog.flash.read(APP_BASE, &mut back).expect("read");
        assert_eq!(back, chunk(0x11));
    }

    #[test]
    fn second_sector_boundary_erases_its_own_sector() {
        let mut flash = RamFlash::blank();
        flash.fill(APP_BASE + SECTOR, SECTOR, 0xC3);
        let mut prog = programmer(flash);

        prog.write(SECTOR, &chunk(0x77), CHUNK as u32).expect("write");

        assert_eq!(prog.flash.erases, [APP_BASE + SECTOR]);
    }

    #[test]
    fn short_length_still_programs_full_chunk() {
        let mut prog = programmer(RamFlash::blank());
        let mut data = chunk(0xEE);
        data[CHUNK - 1] = 0x01;

        prog.write(0, &data, 4).expect("write");

        let mut back = [0u8; CHUNK];
        prog.flash.read(APP_BASE, &mut back).expect("read");
        assert_eq!(back, data);
    }

    #[test]
    fn write_failure_propagates_after_erase_side_effect() {
        let mut flash = RamFlash::blank();
        flash.fill(APP_BASE, SECTOR, 0x00);
        flash.fail_writes = true;
        let mut prog = programmer(flash);

        let result = prog.write(0, &chunk(0xAA), CHUNK as u32);

        assert_eq!(result, Err(FlashError::WriteFailed));
        // The erase is destructive and has already happened.
        assert_eq!(prog.flash.erases, [APP_BASE]);
    }

    #[test]
    fn writes_past_the_region_are_rejected() {
        let mut prog = programmer(RamFlash::blank());

        let result = prog.write(APP_SIZE - (CHUNK as u32) + 1, &chunk(0x00), CHUNK as u32);
        assert_eq!(result, Err(FlashError::OutOfBounds));

        // The last full chunk of the region is still fine.
        prog.write(APP_SIZE - CHUNK as u32, &chunk(0x0F), CHUNK as u32)
            .expect("last chunk");
    }

    #[test]
    fn write_timeout_is_the_fixed_advisory_value() {
        let prog = programmer(RamFlash::blank());
        assert_eq!(prog.get_write_timeout(), Duration::from_millis(1));
    }
}
