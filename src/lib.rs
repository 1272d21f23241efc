//! CSMA/CD link layer for the Elektor-Bus
//!
//! A half-duplex multidrop serial bus (RS-485 style) shared by several nodes,
//! using byte-stuffed CRC-protected fixed-size frames, collision detection by
//! self-echo comparison and randomized exponential backoff.
//!
//! The crate is `no_std`, hardware is reached through the [`Serial`],
//! [`timer::Timer`] and [`timing::Idle`] traits.

#![no_std]

#[cfg(any(test, feature="std"))]
extern crate std;

pub mod log;

pub mod error;

pub mod frame;

pub mod codec;

pub mod timer;

pub mod timing;

pub mod link;

pub mod protocol;

pub mod dump;

pub mod prelude;

use crate::log::FmtError;

/// Serial port with an RS-485 style line driver
///
/// Received bytes are not read through this trait, the receive interrupt
/// feeds them to a [`link::Receiver`].
pub trait Serial {
    type Error: FmtError;

    /// Write a byte, blocking until the transmitter accepts it
    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Block until the last byte has left the shift register
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Enable or disable the line driver
    fn set_driver(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Arm or disarm the receive line pin change interrupt, which reports
    /// edges through [`link::Receiver::on_edge`]
    fn listen_for_activity(&mut self, armed: bool) -> Result<(), Self::Error>;
}
