#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

pub mod boot;
pub mod handoff;
pub mod nor_device;
pub mod programmer;

use thiserror_no_std::Error;

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlashError {
    #[error("address or length not aligned to the device geometry")]
    NotAligned,
    #[error("address range falls outside the accessible region")]
    OutOfBounds,
    #[error("device reported a program failure")]
    WriteFailed,
    #[error("device reported an erase failure")]
    EraseFailed,
    #[error("device reported a read failure")]
    ReadFailed,
}

/// Flash geometry and application image placement, threaded into the
/// boot decision and the programmer at construction so the logic can be
/// exercised against varied layouts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootConfig {
    /// Start of the application image region, relative to the start of
    /// flash. The bootloader's own code lives below this address.
    pub app_base: u32,
    /// Length of the application image region in bytes.
    pub app_size: u32,
    /// Hardware erase granule in bytes. Power of two.
    pub sector_size: u32,
}

impl BootConfig {
    pub const fn new(app_base: u32, app_size: u32, sector_size: u32) -> Self {
        Self {
            app_base,
            app_size,
            sector_size,
        }
    }
}

/// Narrow capability interface over the flash controller. The boot
/// decision and the program policy only ever talk to this trait, so both
/// can run against in-memory fakes on the host.
///
/// Addresses are relative to the start of the device's flash.
pub trait FlashDevice {
    /// Index of the erase sector containing `address`.
    fn sector_of(&self, address: u32) -> u32;

    /// Whether every byte in `address..address + len` still reads as the
    /// erased pattern.
    fn is_blank(&mut self, address: u32, len: u32) -> Result<bool, FlashError>;

    /// Erase the whole sector containing `address`. Destructive for
    /// every byte in the sector, not just `address`.
    fn erase_sector(&mut self, address: u32) -> Result<(), FlashError>;

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError>;

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError>;
}

/// External request to stay in update mode, e.g. a strapped input pin.
/// Sampled once per boot.
pub trait BootSignal {
    fn force_update(&mut self) -> bool;
}

/// Full system reset. The only cancellation mechanism the update session
/// has; there is no graceful unwind of a half-written image.
pub trait Reboot {
    fn reboot(&mut self) -> !;
}
