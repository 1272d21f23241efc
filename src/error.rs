//! Link layer errors
//!
//! Collisions, corruption, overflow and foreign length classes are handled
//! inside the link layer and only show up in the statistics counters, these
//! variants cover caller mistakes and hardware faults.

use core::convert::Infallible;
use core::fmt;

/// Link layer errors, generic over the underlying serial driver error
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Wrapper for underlying serial driver errors
    Serial(E),

    /// Payload does not fit the configured frame length
    PayloadTooLong {
        len: usize,
        max: usize,
    },

    /// Length class bits do not name a supported frame length
    InvalidLengthClass(u8),

    /// Output buffer too small for the encoded frame
    BufferTooSmall,

    /// Command data exceeds the fixed header layout
    DataTooLong,
}

impl Error<Infallible> {
    /// Widen a driver-independent error for use alongside a serial driver
    pub fn widen<E>(self) -> Error<E> {
        match self {
            Error::Serial(never) => match never {},
            Error::PayloadTooLong{ len, max } => Error::PayloadTooLong{ len, max },
            Error::InvalidLengthClass(c) => Error::InvalidLengthClass(c),
            Error::BufferTooSmall => Error::BufferTooSmall,
            Error::DataTooLong => Error::DataTooLong,
        }
    }
}

impl <E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Serial(e) => write!(f, "serial error: {:?}", e),
            Error::PayloadTooLong{ len, max } => write!(f, "payload of {} bytes exceeds {} byte frame", len, max),
            Error::InvalidLengthClass(c) => write!(f, "invalid length class: {}", c),
            Error::BufferTooSmall => write!(f, "buffer too small"),
            Error::DataTooLong => write!(f, "command data too long"),
        }
    }
}

#[cfg(feature = "std")]
impl <E: fmt::Debug> std::error::Error for Error<E> {}

/// Error type for operations that never touch the serial driver
pub type FrameError = Error<Infallible>;
