//! Update session state machine.
//!
//! Consumes one decoded frame at a time, synchronously: there is never
//! more than one flash write in flight. Flash failures become `Nak`
//! replies so the host can report the error and withhold the restart;
//! `Detach` resets the whole system and never returns.

use emberboot::nor_device::ERASED_BYTE;
use emberboot::programmer::FlashProgrammer;
use emberboot::{FlashDevice, FlashError, Reboot};
use postcard::from_bytes_cobs;

use crate::protocol::{NakReason, UpdateReply, UpdateRequest};
use crate::SessionError;

pub struct UpdateSession<const CHUNK: usize, F: FlashDevice, R: Reboot> {
    programmer: FlashProgrammer<CHUNK, F>,
    reboot: R,
}

impl<const CHUNK: usize, F: FlashDevice, R: Reboot> UpdateSession<CHUNK, F, R> {
    pub fn new(programmer: FlashProgrammer<CHUNK, F>, reboot: R) -> Self {
        Self { programmer, reboot }
    }

    /// Handle one COBS frame from `in_buf` (decoded in place) and encode
    /// the reply into `out_buf`. Returns the number of reply bytes, 0 if
    /// the request has no reply.
    pub fn process_frame(
        &mut self,
        in_buf: &mut [u8],
        out_buf: &mut [u8],
    ) -> Result<usize, SessionError> {
        let request: UpdateRequest<CHUNK> = from_bytes_cobs(in_buf)?;

        let reply = match request {
            UpdateRequest::Chunk {
                offset,
                length,
                data,
            } => {
                // Short payloads are padded with the erased pattern; the
                // programmer always consumes a whole chunk.
                let mut chunk = [ERASED_BYTE; CHUNK];
                let take = data.len().min(CHUNK);
                if let (Some(dst), Some(src)) = (chunk.get_mut(..take), data.get(..take)) {
                    dst.copy_from_slice(src);
                }

                match self.programmer.write(offset, &chunk, length) {
                    Ok(()) => UpdateReply::Ack {
                        poll_timeout_ms: self.poll_timeout_ms(),
                    },
                    Err(error) => UpdateReply::Nak {
                        reason: nak_reason(error),
                    },
                }
            }

            UpdateRequest::Detach => self.reboot.reboot(),
        };

        let wrote = postcard::to_slice_cobs(&reply, out_buf)?;
        Ok(wrote.len())
    }

    fn poll_timeout_ms(&self) -> u32 {
        u32::try_from(self.programmer.get_write_timeout().as_millis()).unwrap_or(u32::MAX)
    }
}

fn nak_reason(error: FlashError) -> NakReason {
    match error {
        FlashError::OutOfBounds | FlashError::NotAligned => NakReason::OutOfBounds,
        FlashError::WriteFailed | FlashError::EraseFailed | FlashError::ReadFailed => {
            NakReason::WriteFailed
        }
    }
}
