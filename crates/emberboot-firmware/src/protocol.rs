//! Framed update protocol carried over the bulk endpoints.
//!
//! Frames are postcard-encoded and COBS-delimited. The host drives the
//! session: one `Chunk` per transfer unit, then `Detach` once the image
//! is complete.

use heapless::Vec;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub enum UpdateRequest<const CHUNK: usize> {
    /// One transfer chunk of the new image. `offset` is relative to the
    /// application image region base and chunk-aligned; `length` says how
    /// many payload bytes are meaningful, but a full chunk of flash is
    /// consumed either way.
    Chunk {
        offset: u32,
        length: u32,
        data: Vec<u8, CHUNK>,
    },
    /// The image is complete; restart into it. Terminal.
    Detach,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakReason {
    /// The device refused or failed the program operation.
    WriteFailed,
    /// The chunk would land outside the application image region.
    OutOfBounds,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReply {
    /// Chunk accepted. The host should wait `poll_timeout_ms` before the
    /// next request.
    Ack { poll_timeout_ms: u32 },
    /// Chunk rejected; the host must not detach into a broken image.
    Nak { reason: NakReason },
}
