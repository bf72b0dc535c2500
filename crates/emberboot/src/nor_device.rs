//! Adapter from `embedded-storage` NOR flash drivers to the narrow
//! [`FlashDevice`] capability the boot logic consumes.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::{FlashDevice, FlashError};

/// Erased-state pattern of NOR flash.
pub const ERASED_BYTE: u8 = 0xFF;

/// Wraps any `embedded-storage` NOR flash. Sector geometry comes from
/// the driver's `ERASE_SIZE`; blank checks are read-back based.
pub struct NorDevice<F> {
    flash: F,
}

impl<F> NorDevice<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}

impl<F: ReadNorFlash + NorFlash> NorDevice<F> {
    fn sector_size() -> Result<u32, FlashError> {
        u32::try_from(F::ERASE_SIZE).map_err(|_| FlashError::OutOfBounds)
    }
}

impl<F: ReadNorFlash + NorFlash> FlashDevice for NorDevice<F> {
    fn sector_of(&self, address: u32) -> u32 {
        let sector_size = u32::try_from(F::ERASE_SIZE).unwrap_or(u32::MAX);
        address.checked_div(sector_size).unwrap_or(0)
    }

    fn is_blank(&mut self, address: u32, len: u32) -> Result<bool, FlashError> {
        let mut scratch = [0u8; 64];
        let end = address.checked_add(len).ok_or(FlashError::OutOfBounds)?;
        let mut cursor = address;
        while cursor < end {
            let remaining = end.checked_sub(cursor).ok_or(FlashError::OutOfBounds)?;
            let take = (remaining as usize).min(scratch.len());
            let buf = scratch.get_mut(..take).ok_or(FlashError::OutOfBounds)?;
            self.flash
                .read(cursor, buf)
                .map_err(|error| map_flash_error(error, FlashError::ReadFailed))?;
            if buf.iter().any(|&byte| byte != ERASED_BYTE) {
                return Ok(false);
            }
            cursor = cursor
                .checked_add(take as u32)
                .ok_or(FlashError::OutOfBounds)?;
        }
        Ok(true)
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), FlashError> {
        let sector_size = Self::sector_size()?;
        let start = address
            .checked_rem(sector_size)
            .and_then(|rem| address.checked_sub(rem))
            .ok_or(FlashError::OutOfBounds)?;
        let end = start
            .checked_add(sector_size)
            .ok_or(FlashError::OutOfBounds)?;
        self.flash
            .erase(start, end)
            .map_err(|error| map_flash_error(error, FlashError::EraseFailed))
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        self.flash
            .write(address, data)
            .map_err(|error| map_flash_error(error, FlashError::WriteFailed))
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.flash
            .read(address, buf)
            .map_err(|error| map_flash_error(error, FlashError::ReadFailed))
    }
}

fn map_flash_error<E: NorFlashError>(error: E, fallback: FlashError) -> FlashError {
    match error.kind() {
        NorFlashErrorKind::NotAligned => FlashError::NotAligned,
        NorFlashErrorKind::OutOfBounds => FlashError::OutOfBounds,
        _ => fallback,
    }
}
