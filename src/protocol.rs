//! BusControl and H61 message headers
//
// 16 byte frame layout shared by both protocols:
//   [0]      PROTOCOL_ID
//   [1..3]   destination node, big-endian
//   [3..5]   source node, big-endian
//   [5]      command, top bit set on responses
//   [6..16]  command data
//
// Command codes are defined by the applications, only the raw byte is exposed.

use core::convert::TryFrom;
use core::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, FrameError};
use crate::frame::{Frame, LengthClass, ProtocolId, ProtocolType};

const DEST_OFFSET: usize = 1;
const SRC_OFFSET: usize = 3;
const COMMAND_OFFSET: usize = 5;

/// Offset of the command data within the frame
pub const DATA_OFFSET: usize = 6;

/// Command data bytes available in a 16 byte frame
pub const MAX_DATA_LEN: usize = 10;

const RESPONSE_FLAG: u8 = 0x80;

/// 16-bit bus node address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeId(pub u16);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId(0x{:04x})", self.0)
    }
}

impl From<u16> for NodeId {
    fn from(v: u16) -> Self {
        NodeId(v)
    }
}

/// Decoded BusControl / H61 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub protocol: ProtocolType,
    pub destination: NodeId,
    pub source: NodeId,
    /// Command code, response flag removed
    pub command: u8,
    pub response: bool,
}

impl Header {
    /// Decode the header from a received frame
    pub fn decode(frame: &Frame) -> Result<Self, FrameError> {
        let b = frame.as_bytes();
        let id = ProtocolId::try_from(b[0])?;

        Ok(Self {
            protocol: id.kind,
            destination: NodeId(BigEndian::read_u16(&b[DEST_OFFSET..])),
            source: NodeId(BigEndian::read_u16(&b[SRC_OFFSET..])),
            command: b[COMMAND_OFFSET] & !RESPONSE_FLAG,
            response: b[COMMAND_OFFSET] & RESPONSE_FLAG != 0,
        })
    }

    /// Write the header into the first bytes of a frame
    pub fn encode(&self, frame: &mut Frame) {
        let id = ProtocolId::new(frame.class(), self.protocol);
        let b = frame.as_bytes_mut();

        b[0] = id.to_byte();
        BigEndian::write_u16(&mut b[DEST_OFFSET..], self.destination.0);
        BigEndian::write_u16(&mut b[SRC_OFFSET..], self.source.0);

        b[COMMAND_OFFSET] = self.command & !RESPONSE_FLAG;
        if self.response {
            b[COMMAND_OFFSET] |= RESPONSE_FLAG;
        }
    }

    /// Header for the response to this message
    pub fn reply(&self) -> Self {
        Self {
            protocol: self.protocol,
            destination: self.source,
            source: self.destination,
            command: self.command,
            response: true,
        }
    }
}

/// Command data of a BusControl / H61 frame
pub fn data(frame: &Frame) -> &[u8] {
    &frame.as_bytes()[DATA_OFFSET..]
}

/// Builder for 16 byte command frames
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    header: Header,
    data: [u8; MAX_DATA_LEN],
    len: usize,
}

impl Message {
    pub fn new(protocol: ProtocolType, destination: NodeId, source: NodeId, command: u8) -> Self {
        Self {
            header: Header { protocol, destination, source, command, response: false },
            data: [0u8; MAX_DATA_LEN],
            len: 0,
        }
    }

    /// Mark as a response
    pub fn response(mut self) -> Self {
        self.header.response = true;
        self
    }

    /// Set the command data, at most [`MAX_DATA_LEN`] bytes
    pub fn with_data(mut self, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_DATA_LEN {
            return Err(Error::DataTooLong);
        }

        self.data = [0u8; MAX_DATA_LEN];
        self.data[..data.len()].copy_from_slice(data);
        self.len = data.len();

        Ok(self)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Build the frame, unused data bytes are zero
    pub fn to_frame(&self) -> Frame {
        let mut f = Frame::zeroed(LengthClass::Short);

        self.header.encode(&mut f);
        f.as_bytes_mut()[DATA_OFFSET..][..self.len].copy_from_slice(&self.data[..self.len]);

        f
    }
}

impl From<&Message> for Frame {
    fn from(m: &Message) -> Self {
        m.to_frame()
    }
}
