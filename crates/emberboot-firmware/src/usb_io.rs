//! Frame pump between the bulk endpoints and the update session.

use emberboot::{FlashDevice, Reboot};
use heapless::Vec;

use crate::session::UpdateSession;
use crate::usb_vendor::{UpdateReceiver, UpdateSender};
use embassy_usb::driver::{Driver, EndpointError};

pub struct Disconnected {}

impl From<EndpointError> for Disconnected {
    fn from(val: EndpointError) -> Self {
        match val {
            EndpointError::BufferOverflow => Disconnected {},
            EndpointError::Disabled => Disconnected {},
        }
    }
}

/// Accumulate COBS frames from the receiver, hand each completed frame to
/// the session and ship the reply. Runs until the endpoint drops or the
/// session detaches (which resets the system and never returns).
pub async fn io_loop<'d, D, F, R, const CHUNK: usize, const IN_CAP: usize>(
    receiver: &mut UpdateReceiver<'d, D>,
    sender: &mut UpdateSender<'d, D>,
    session: &mut UpdateSession<CHUNK, F, R>,
    usb_buf: &mut [u8],
    frame: &mut Vec<u8, IN_CAP>,
    out_buf: &mut [u8],
) -> Result<(), Disconnected>
where
    D: Driver<'d>,
    F: FlashDevice,
    R: Reboot,
{
    loop {
        let n = receiver.read_packet(usb_buf).await?;
        let Some(data) = usb_buf.get(..n) else {
            continue;
        };
        for &byte in data {
            if frame.push(byte).is_err() {
                frame.clear();
                continue;
            }

            if byte == 0 {
                let wrote = match session.process_frame(frame.as_mut_slice(), out_buf) {
                    Ok(wrote) => wrote,
                    // Malformed frame: drop it, the host will time out
                    // and resend.
                    Err(_) => 0,
                };
                frame.clear();

                if wrote > 0 {
                    if let Some(bytes) = out_buf.get(..wrote) {
                        sender.write_packet(bytes).await?;
                    }
                }
            }
        }
    }
}
