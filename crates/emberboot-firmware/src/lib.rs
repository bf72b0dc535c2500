#![no_std]

pub mod protocol;
pub mod session;
pub mod usb_io;
pub mod usb_vendor;

use thiserror_no_std::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("malformed update frame")]
    Postcard(#[from] postcard::Error),
}
