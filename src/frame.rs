//! Elektor-Bus frame types
//
// Frame block layout (before CRC and stuffing):
//   [0]       PROTOCOL_ID, upper 2 bits length class, lower 6 bits protocol type
//   [1..len]  protocol payload
// The CRC-16 over the whole block follows on the wire, high byte first.

use core::convert::TryFrom;
use core::fmt;

use crate::codec;
use crate::error::{Error, FrameError};

/// Largest frame block of any length class
pub const MAX_FRAME_LEN: usize = 48;

/// Length of the CRC trailer
pub const CRC_LEN: usize = 2;

const LENGTH_CLASS_SHIFT: u8 = 6;
const PROTOCOL_TYPE_MASK: u8 = 0x3f;

/// Frame length class, encoded in the top bits of the PROTOCOL_ID byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LengthClass {
    /// 16 byte frames, used by the BusControl and H61 protocols
    Short = 0,
    /// 32 byte frames
    Medium = 1,
    /// 48 byte frames
    Long = 2,
}

impl LengthClass {
    /// Frame block length in bytes (PROTOCOL_ID included, CRC excluded)
    pub const fn len(self) -> usize {
        match self {
            LengthClass::Short => 16,
            LengthClass::Medium => 32,
            LengthClass::Long => 48,
        }
    }

    /// Number of logical bytes on the wire (block and CRC, before stuffing)
    pub const fn wire_len(self) -> usize {
        self.len() + CRC_LEN
    }

    /// Parse the two length class bits, `0b11` is reserved
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0 => Some(LengthClass::Short),
            1 => Some(LengthClass::Medium),
            2 => Some(LengthClass::Long),
            _ => None,
        }
    }

    /// Extract the length class from a PROTOCOL_ID byte
    pub const fn of_protocol_id(id: u8) -> Option<Self> {
        Self::from_bits(id >> LENGTH_CLASS_SHIFT)
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl Default for LengthClass {
    fn default() -> Self {
        LengthClass::Short
    }
}

/// Protocol type carried in the low 6 bits of the PROTOCOL_ID byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolType {
    BusControl,
    H61,
    DebugMsg,
    Other(u8),
}

impl From<u8> for ProtocolType {
    fn from(v: u8) -> Self {
        match v & PROTOCOL_TYPE_MASK {
            0x01 => ProtocolType::BusControl,
            0x06 => ProtocolType::H61,
            0x1f => ProtocolType::DebugMsg,
            other => ProtocolType::Other(other),
        }
    }
}

impl From<ProtocolType> for u8 {
    fn from(p: ProtocolType) -> u8 {
        match p {
            ProtocolType::BusControl => 0x01,
            ProtocolType::H61 => 0x06,
            ProtocolType::DebugMsg => 0x1f,
            ProtocolType::Other(v) => v & PROTOCOL_TYPE_MASK,
        }
    }
}

/// Decoded PROTOCOL_ID byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolId {
    pub class: LengthClass,
    pub kind: ProtocolType,
}

impl ProtocolId {
    pub const fn new(class: LengthClass, kind: ProtocolType) -> Self {
        Self { class, kind }
    }

    pub fn to_byte(&self) -> u8 {
        (self.class.bits() << LENGTH_CLASS_SHIFT) | u8::from(self.kind)
    }
}

impl TryFrom<u8> for ProtocolId {
    type Error = FrameError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let class = LengthClass::of_protocol_id(v)
            .ok_or(Error::InvalidLengthClass(v >> LENGTH_CLASS_SHIFT))?;

        Ok(Self { class, kind: ProtocolType::from(v) })
    }
}

/// Fixed-size frame block with owned storage
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    class: LengthClass,
    data: [u8; MAX_FRAME_LEN],
}

impl Frame {
    /// Create an all-zero frame of the provided length class
    pub const fn zeroed(class: LengthClass) -> Self {
        Self {
            class,
            data: [0u8; MAX_FRAME_LEN],
        }
    }

    /// Build a frame from a payload, zero-padding to the class length.
    ///
    /// The first payload byte is the PROTOCOL_ID and is copied as-is.
    pub fn from_payload(class: LengthClass, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > class.len() {
            return Err(Error::PayloadTooLong{ len: payload.len(), max: class.len() });
        }

        let mut f = Self::zeroed(class);
        f.data[..payload.len()].copy_from_slice(payload);

        Ok(f)
    }

    /// Build a frame from a complete block, taking the class from the PROTOCOL_ID byte
    pub fn from_block(block: &[u8]) -> Result<Self, FrameError> {
        let id = *block.first().ok_or(Error::BufferTooSmall)?;
        let class = LengthClass::of_protocol_id(id)
            .ok_or(Error::InvalidLengthClass(id >> LENGTH_CLASS_SHIFT))?;

        if block.len() < class.len() {
            return Err(Error::BufferTooSmall);
        }
        if block.len() > class.len() {
            return Err(Error::PayloadTooLong{ len: block.len(), max: class.len() });
        }

        Self::from_payload(class, block)
    }

    pub fn class(&self) -> LengthClass {
        self.class
    }

    pub fn len(&self) -> usize {
        self.class.len()
    }

    /// Frame block (PROTOCOL_ID and payload)
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.class.len()]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let n = self.class.len();
        &mut self.data[..n]
    }

    /// Raw PROTOCOL_ID byte
    pub fn protocol_id(&self) -> u8 {
        self.data[0]
    }

    /// Compute the frame CRC
    pub fn crc(&self) -> u16 {
        codec::compute_crc(self.as_bytes())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("class", &self.class)
            .field("data", &self.as_bytes())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn protocol_id() {
        let id = ProtocolId::new(LengthClass::Short, ProtocolType::BusControl);
        assert_eq!(id.to_byte(), 0x01);

        let id = ProtocolId::new(LengthClass::Medium, ProtocolType::DebugMsg);
        assert_eq!(id.to_byte(), 0x5f);
        assert_eq!(ProtocolId::try_from(0x5f), Ok(id));

        let id = ProtocolId::try_from(0x86).unwrap();
        assert_eq!(id.class, LengthClass::Long);
        assert_eq!(id.kind, ProtocolType::H61);

        assert_eq!(ProtocolId::try_from(0xc1), Err(Error::InvalidLengthClass(3)));
        assert_eq!(ProtocolType::from(0x22), ProtocolType::Other(0x22));
    }

    #[test]
    fn frame_padding() {
        let f = Frame::from_payload(LengthClass::Short, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(f.len(), 16);
        assert_eq!(&f.as_bytes()[..3], &[0x01, 0x02, 0x03]);
        assert!(f.as_bytes()[3..].iter().all(|b| *b == 0));

        let long = [0xaa; 17];
        assert_eq!(
            Frame::from_payload(LengthClass::Short, &long),
            Err(Error::PayloadTooLong{ len: 17, max: 16 })
        );
    }

    #[test]
    fn frame_from_block() {
        let mut block = [0u8; 32];
        block[0] = 0x46;

        let f = Frame::from_block(&block).unwrap();
        assert_eq!(f.class(), LengthClass::Medium);
        assert_eq!(f.as_bytes(), &block[..]);

        assert_eq!(Frame::from_block(&block[..16]), Err(Error::BufferTooSmall));
        assert_eq!(Frame::from_block(&[]), Err(Error::BufferTooSmall));

        let long = [0x06u8; 17];
        assert_eq!(Frame::from_block(&long), Err(Error::PayloadTooLong{ len: 17, max: 16 }));
    }
}
