//! Control handoff to the resident application.
//!
//! The application image region starts with a standard Cortex-M vector
//! table: word 0 is the initial stack pointer, word 1 the reset handler.
//! Handing over means pointing the active vector table at the region,
//! loading MSP from word 0 and branching to word 1. Everything past the
//! MSP load runs without the bootloader's stack, so the final sequence
//! lives in a single `asm!` block and never returns.

use crate::{FlashDevice, FlashError};

/// The first 8 bytes of the application image region.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AppHeader {
    pub initial_sp: u32,
    pub entry_point: u32,
}

impl AppHeader {
    /// Header length in flash: two little-endian words.
    pub const SIZE: u32 = 8;

    pub fn from_bytes(bytes: [u8; Self::SIZE as usize]) -> Self {
        let initial_sp = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let entry_point = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self {
            initial_sp,
            entry_point,
        }
    }

    pub fn read<F: FlashDevice>(flash: &mut F, app_base: u32) -> Result<Self, FlashError> {
        let mut bytes = [0u8; Self::SIZE as usize];
        flash.read(app_base, &mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Relocate the vector table to `vector_base` and start the application
/// whose header lives there.
///
/// `vector_base` is the absolute, memory-mapped address of the
/// application's vector table (flash base plus the configured
/// application region offset).
///
/// # Safety
///
/// Terminal: the caller's stack is gone after the MSP load and nothing
/// here or in the application may touch it again. Call this once, early,
/// with no interrupts enabled and a header that was blank-checked by the
/// boot decision. A corrupt header faults in the application's context;
/// there is no recovery path.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub unsafe fn start_application(vector_base: u32) -> ! {
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;

    unsafe {
        let initial_sp = (vector_base as *const u32).read_volatile();
        let entry_point = (vector_base as *const u32).offset(1).read_volatile();

        // From here on every exception already vectors into the
        // application's handlers.
        SCB_VTOR.write_volatile(vector_base);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();

        // No locals, no calls, no epilogue after the MSP write.
        core::arch::asm!(
            "msr msp, {sp}",
            "bx {entry}",
            sp = in(reg) initial_sp,
            entry = in(reg) entry_point,
            options(noreturn),
        );
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::FlashDevice;

    struct ByteFlash {
        mem: std::vec::Vec<u8>,
    }

    impl FlashDevice for ByteFlash {
        fn sector_of(&self, address: u32) -> u32 {
            address / 4096
        }

        fn is_blank(&mut self, address: u32, len: u32) -> Result<bool, FlashError> {
            let start = address as usize;
            Ok(self.mem[start..start + len as usize]
                .iter()
                .all(|&byte| byte == 0xFF))
        }

        fn erase_sector(&mut self, _address: u32) -> Result<(), FlashError> {
            Ok(())
        }

        fn write(&mut self, _address: u32, _data: &[u8]) -> Result<(), FlashError> {
            Ok(())
        }

        fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
            let start = address as usize;
            buf.copy_from_slice(&self.mem[start..start + buf.len()]);
            Ok(())
        }
    }

    #[test]
    fn header_words_are_little_endian() {
        let header = AppHeader::from_bytes([0x00, 0x10, 0x00, 0x20, 0x05, 0x20, 0x00, 0x00]);
        assert_eq!(header.initial_sp, 0x2000_1000);
        assert_eq!(header.entry_point, 0x0000_2005);
    }

    #[test]
    fn header_reads_from_the_region_base() {
        let app_base = 0x2000usize;
        let mut mem = std::vec![0xFF; 0x3000];
        mem[app_base..app_base + 8]
            .copy_from_slice(&[0x00, 0x10, 0x00, 0x20, 0x05, 0x20, 0x00, 0x00]);
        let mut flash = ByteFlash { mem };

        let header = AppHeader::read(&mut flash, app_base as u32).expect("read");
        assert_eq!(
            header,
            AppHeader {
                initial_sp: 0x2000_1000,
                entry_point: 0x0000_2005,
            }
        );
    }
}
