//! Passive bus decoder for monitoring tools
//!
//! Unlike the link [`Receiver`](crate::link::Receiver) this accepts every
//! length class and reports every error instead of only counting it, it never
//! transmits and needs no shared link context.

use byteorder::{BigEndian, ByteOrder};

use crate::codec::{Crc16, Destuffer, Symbol};
use crate::frame::{Frame, LengthClass, CRC_LEN};
use crate::log::{debug, trace};

/// Decoded bus event
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Frame received with a valid CRC
    Frame(Frame),
    /// Frame complete but CRC mismatched
    CrcError { expected: u16, received: u16 },
    /// Sync received mid-frame after `received` logical bytes
    Truncated { received: usize },
    /// PROTOCOL_ID with the reserved length class, skipped until the next sync
    UnknownClass(u8),
}

/// Per-stream decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecoderStats {
    pub frames: u32,
    pub crc_errors: u32,
    pub truncated: u32,
    pub unknown_class: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    /// Between frames
    Idle,
    /// Sync seen, expecting PROTOCOL_ID
    Start,
    /// `index` logical bytes of the current frame received
    Body { index: usize },
    /// Skipping until the next sync
    Skip,
}

/// Streaming decoder over raw wire bytes
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    destuffer: Destuffer,
    state: State,
    frame: Frame,
    crc: Crc16,
    rx_crc: [u8; CRC_LEN],
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            destuffer: Destuffer::new(),
            state: State::Idle,
            frame: Frame::zeroed(LengthClass::Short),
            crc: Crc16::new(),
            rx_crc: [0u8; CRC_LEN],
            stats: DecoderStats::default(),
        }
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Feed one wire byte, returning an event when one completes
    pub fn push(&mut self, wire: u8) -> Option<Event> {
        match self.destuffer.push(wire)? {
            Symbol::Sync => self.on_sync(),
            Symbol::Byte(b) => self.on_byte(b),
        }
    }

    fn on_sync(&mut self) -> Option<Event> {
        let received = match self.state {
            State::Start => Some(0),
            State::Body{ index } => Some(index),
            _ => None,
        };

        self.state = State::Start;
        self.crc.reset();

        let received = received?;
        debug!("Truncated frame after {} bytes", received);
        self.stats.truncated = self.stats.truncated.wrapping_add(1);

        Some(Event::Truncated{ received })
    }

    fn on_byte(&mut self, b: u8) -> Option<Event> {
        match self.state {
            State::Idle | State::Skip => None,
            State::Start => self.on_protocol_id(b),
            State::Body{ index } => self.on_body(index, b),
        }
    }

    fn on_protocol_id(&mut self, id: u8) -> Option<Event> {
        let class = match LengthClass::of_protocol_id(id) {
            Some(c) => c,
            None => {
                debug!("Unknown length class in protocol id {}", id);
                self.state = State::Skip;
                self.stats.unknown_class = self.stats.unknown_class.wrapping_add(1);
                return Some(Event::UnknownClass(id));
            }
        };

        self.frame = Frame::zeroed(class);
        self.frame.as_bytes_mut()[0] = id;
        self.crc.update(id);
        self.state = State::Body{ index: 1 };

        None
    }

    fn on_body(&mut self, index: usize, b: u8) -> Option<Event> {
        let class = self.frame.class();
        let len = class.len();

        if index < len {
            self.frame.as_bytes_mut()[index] = b;
            self.crc.update(b);
        } else {
            self.rx_crc[index - len] = b;
        }

        if index + 1 < class.wire_len() {
            self.state = State::Body{ index: index + 1 };
            return None;
        }

        self.state = State::Idle;

        let received = BigEndian::read_u16(&self.rx_crc);
        if received != self.crc.value {
            debug!("CRC error (computed: {}, received: {})", self.crc.value, received);
            self.stats.crc_errors = self.stats.crc_errors.wrapping_add(1);
            return Some(Event::CrcError{ expected: self.crc.value, received });
        }

        trace!("Decoded frame: {:?}", self.frame);
        self.stats.frames = self.stats.frames.wrapping_add(1);

        Some(Event::Frame(self.frame.clone()))
    }
}
