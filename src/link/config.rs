//! Link arbiter configuration

use crate::frame::LengthClass;

/// Backoff counter ceiling, bounds the random wait window to 2^(8/2) = 16 octets
pub const MAX_BACKOFF: u8 = 8;

/// Configuration for the link arbiter
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Length class of frames sent and accepted by this node
    pub length_class: LengthClass,

    /// Octet-times to wait for the receive path to verify our own echo
    pub echo_timeout_octets: u32,

    /// Octet-times of silence required before the bus is considered idle
    pub idle_octets: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            length_class: LengthClass::Short,
            echo_timeout_octets: 4,
            idle_octets: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
