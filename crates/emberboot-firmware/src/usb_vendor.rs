//! Vendor-specific bulk interface the update host talks to.

use embassy_usb::driver::{Driver, Endpoint, EndpointError, EndpointIn, EndpointOut};
use embassy_usb::Builder;

const USB_CLASS_VENDOR: u8 = 0xff;
const USB_SUBCLASS_NONE: u8 = 0x00;
const USB_PROTOCOL_NONE: u8 = 0x00;

pub struct UpdatePort<'d, D: Driver<'d>> {
    read_ep: D::EndpointOut,
    write_ep: D::EndpointIn,
    max_packet_size: u16,
}

impl<'d, D: Driver<'d>> UpdatePort<'d, D> {
    pub fn new(builder: &mut Builder<'d, D>, max_packet_size: u16) -> Self {
        let mut function =
            builder.function(USB_CLASS_VENDOR, USB_SUBCLASS_NONE, USB_PROTOCOL_NONE);
        let mut interface = function.interface();
        let mut alt = interface.alt_setting(
            USB_CLASS_VENDOR,
            USB_SUBCLASS_NONE,
            USB_PROTOCOL_NONE,
            None,
        );
        let read_ep = alt.endpoint_bulk_out(None, max_packet_size);
        let write_ep = alt.endpoint_bulk_in(None, max_packet_size);
        drop(function);

        Self {
            read_ep,
            write_ep,
            max_packet_size,
        }
    }

    pub fn split(self) -> (UpdateSender<'d, D>, UpdateReceiver<'d, D>) {
        let sender = UpdateSender {
            write_ep: self.write_ep,
            max_packet_size: self.max_packet_size,
        };
        let receiver = UpdateReceiver {
            read_ep: self.read_ep,
            max_packet_size: self.max_packet_size,
        };
        (sender, receiver)
    }
}

pub struct UpdateReceiver<'d, D: Driver<'d>> {
    read_ep: D::EndpointOut,
    max_packet_size: u16,
}

impl<'d, D: Driver<'d>> UpdateReceiver<'d, D> {
    pub async fn wait_connection(&mut self) {
        self.read_ep.wait_enabled().await;
    }

    /// Read one transfer: packets are concatenated until a short packet
    /// ends the transfer or `data` is full.
    pub async fn read_packet(&mut self, data: &mut [u8]) -> Result<usize, EndpointError> {
        let mut n = 0;
        loop {
            let Some(buf) = data.get_mut(n..) else {
                return Ok(n);
            };
            if buf.is_empty() {
                return Ok(n);
            }
            let i = self.read_ep.read(buf).await?;
            n = n.saturating_add(i);
            if i < self.max_packet_size as usize {
                return Ok(n);
            }
        }
    }
}

pub struct UpdateSender<'d, D: Driver<'d>> {
    write_ep: D::EndpointIn,
    max_packet_size: u16,
}

impl<'d, D: Driver<'d>> UpdateSender<'d, D> {
    pub async fn wait_connection(&mut self) {
        self.write_ep.wait_enabled().await;
    }

    pub async fn write_packet(&mut self, data: &[u8]) -> Result<(), EndpointError> {
        for chunk in data.chunks(self.max_packet_size as usize) {
            self.write_ep.write(chunk).await?;
        }
        if data.len() % self.max_packet_size as usize == 0 {
            // Terminate a max-size transfer with a zero-length packet.
            self.write_ep.write(&[]).await?;
        }
        Ok(())
    }
}
