//! Power-on boot decision.
//!
//! Runs exactly once, before any peripheral other than the boot signal
//! input is touched. There is no re-evaluation: `RunApplication` hands
//! control away for good and `EnterUpdateMode` falls through into the
//! update transport.

use crate::handoff::AppHeader;
use crate::{BootConfig, BootSignal, FlashDevice, FlashError};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootPath {
    /// Hand control to the resident application.
    RunApplication,
    /// Stay resident and bring up the update transport.
    EnterUpdateMode,
}

/// Decide between the resident application and update mode.
///
/// The signal is sampled once and the application region's vector-table
/// header is blank-checked once. The application runs only when the
/// signal is not asserted and the header is programmed. A header that is
/// non-blank but corrupt is not detected here; the handoff will be
/// attempted regardless.
pub fn evaluate<S, F>(
    config: &BootConfig,
    signal: &mut S,
    flash: &mut F,
) -> Result<BootPath, FlashError>
where
    S: BootSignal,
    F: FlashDevice,
{
    let force_update = signal.force_update();
    let header_blank = flash.is_blank(config.app_base, AppHeader::SIZE)?;

    if !force_update && !header_blank {
        Ok(BootPath::RunApplication)
    } else {
        Ok(BootPath::EnterUpdateMode)
    }
}
