//! Frame codec, CRC and byte stuffing
//!
//! Frames are sent as `FRAME_SYNC` followed by the stuffed frame block and
//! the stuffed big-endian CRC. Any block or CRC byte equal to `FRAME_SYNC`
//! or `FRAME_ESC` is sent as `FRAME_ESC, byte ^ ESC_MASK`, so a `FRAME_SYNC`
//! on the wire always starts a new frame.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, FrameError};
use crate::frame::{Frame, CRC_LEN, MAX_FRAME_LEN};

/// Start of frame marker, never escaped
pub const FRAME_SYNC: u8 = 0x7e;

/// Escape prefix
pub const FRAME_ESC: u8 = 0x7d;

/// Applied to escaped bytes
pub const ESC_MASK: u8 = 0x20;

/// Worst case wire length of a frame (sync plus every byte escaped)
pub const MAX_WIRE_LEN: usize = 1 + 2 * (MAX_FRAME_LEN + CRC_LEN);

/// CRC initial value
pub const CRC_INIT: u16 = 0xffff;

// x^16 + x^12 + x^5 + 1, bit-reversed (LSB first)
const CRC_POLY: u16 = 0x8408;

/// Running CRC-16/CCITT accumulator
///
/// Uses the LSB-first update of the AVR `_crc_ccitt_update` routine with an
/// initial value of 0xFFFF and no final XOR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc16 {
    pub value: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    pub const fn new() -> Self {
        Self { value: CRC_INIT }
    }

    /// Add a single byte to the CRC (bitwise form)
    pub fn update(&mut self, byte: u8) {
        self.value = update_bitwise(self.value, byte);
    }

    /// Add a buffer to the CRC calculation
    pub fn update_slice(&mut self, data: &[u8]) {
        for b in data {
            self.update(*b);
        }
    }

    pub fn reset(&mut self) {
        self.value = CRC_INIT;
    }
}

const fn update_bitwise(mut crc: u16, byte: u8) -> u16 {
    crc ^= byte as u16;

    let mut i = 0;
    while i < 8 {
        if crc & 0x0001 != 0 {
            crc = (crc >> 1) ^ CRC_POLY;
        } else {
            crc >>= 1;
        }
        i += 1;
    }

    crc
}

const fn crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];

    let mut i = 0;
    while i < 256 {
        table[i] = update_bitwise(0, i as u8);
        i += 1;
    }

    table
}

static CRC_TABLE: [u16; 256] = crc_table();

/// Compute the frame CRC using the lookup table
pub fn compute_crc(data: &[u8]) -> u16 {
    data.iter().fold(CRC_INIT, |crc, b| {
        (crc >> 8) ^ CRC_TABLE[((crc ^ *b as u16) & 0xff) as usize]
    })
}

/// One wire byte, or an escape sequence of two
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stuffed {
    Plain([u8; 1]),
    Escaped([u8; 2]),
}

impl Stuffed {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Stuffed::Plain(b) => &b[..],
            Stuffed::Escaped(b) => &b[..],
        }
    }
}

/// Stuff a single raw byte
pub fn encode_byte(raw: u8) -> Stuffed {
    if raw == FRAME_SYNC || raw == FRAME_ESC {
        Stuffed::Escaped([FRAME_ESC, raw ^ ESC_MASK])
    } else {
        Stuffed::Plain([raw])
    }
}

/// De-stuff a single non-sync wire byte.
///
/// Returns the raw byte (if one is complete) and the new escape flag.
/// `FRAME_SYNC` must be handled by the caller before this is reached.
pub fn decode_byte(wire: u8, escaped: bool) -> (Option<u8>, bool) {
    if escaped {
        (Some(wire ^ ESC_MASK), false)
    } else if wire == FRAME_ESC {
        (None, true)
    } else {
        (Some(wire), false)
    }
}

/// Iterator over the complete wire image of a frame
#[derive(Debug, Clone)]
pub struct WireBytes<'a> {
    block: &'a [u8],
    crc: [u8; CRC_LEN],
    started: bool,
    index: usize,
    pending: Option<u8>,
}

impl <'a> WireBytes<'a> {
    /// Iterate over the wire image of a frame with a precomputed CRC
    pub fn new(frame: &'a Frame, crc: u16) -> Self {
        let mut c = [0u8; CRC_LEN];
        BigEndian::write_u16(&mut c, crc);

        Self {
            block: frame.as_bytes(),
            crc: c,
            started: false,
            index: 0,
            pending: None,
        }
    }

    /// Logical (un-stuffed) byte at `index`, CRC bytes follow the block
    fn logical(&self, index: usize) -> Option<u8> {
        if index < self.block.len() {
            Some(self.block[index])
        } else {
            self.crc.get(index - self.block.len()).copied()
        }
    }
}

impl <'a> Iterator for WireBytes<'a> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if !self.started {
            self.started = true;
            return Some(FRAME_SYNC);
        }

        if let Some(b) = self.pending.take() {
            return Some(b);
        }

        let raw = self.logical(self.index)?;
        self.index += 1;

        match encode_byte(raw) {
            Stuffed::Plain([b]) => Some(b),
            Stuffed::Escaped([esc, b]) => {
                self.pending = Some(b);
                Some(esc)
            }
        }
    }
}

/// Write the wire image of a frame into `buff`, returning the encoded length
pub fn encode_frame(frame: &Frame, buff: &mut [u8]) -> Result<usize, FrameError> {
    let mut n = 0;

    for b in WireBytes::new(frame, frame.crc()) {
        *buff.get_mut(n).ok_or(Error::BufferTooSmall)? = b;
        n += 1;
    }

    Ok(n)
}

/// De-stuffed wire symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Symbol {
    /// Start of a new frame
    Sync,
    /// Raw frame byte
    Byte(u8),
}

/// Streaming de-stuffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Destuffer {
    escaped: bool,
}

impl Destuffer {
    pub const fn new() -> Self {
        Self { escaped: false }
    }

    /// Feed a wire byte, a sync always wins over a pending escape
    pub fn push(&mut self, wire: u8) -> Option<Symbol> {
        if wire == FRAME_SYNC {
            self.escaped = false;
            return Some(Symbol::Sync);
        }

        let (raw, escaped) = decode_byte(wire, self.escaped);
        self.escaped = escaped;

        raw.map(Symbol::Byte)
    }

    pub fn reset(&mut self) {
        self.escaped = false;
    }
}

#[cfg(test)]
mod test {
    use std::vec::Vec;

    use super::*;
    use crate::frame::LengthClass;

    fn destuff(wire: &[u8]) -> Vec<Symbol> {
        let mut d = Destuffer::new();
        wire.iter().filter_map(|b| d.push(*b)).collect()
    }

    #[test]
    fn crc_check_value() {
        assert_eq!(compute_crc(b"123456789"), 0x6f91);

        let mut c = Crc16::new();
        c.update_slice(b"123456789");
        assert_eq!(c.value, 0x6f91);
    }

    #[test]
    fn crc_table_matches_bitwise() {
        let mut seed = 0x1234_5678u32;

        for len in 0..64 {
            let data: Vec<u8> = (0..len).map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (seed >> 16) as u8
            }).collect();

            let mut c = Crc16::new();
            c.update_slice(&data);

            assert_eq!(compute_crc(&data), c.value, "mismatch for {:02x?}", data);
        }
    }

    #[test]
    fn crc_bit_flip() {
        let block = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let reference = compute_crc(&block);
        assert_eq!(compute_crc(&block), reference);

        for i in 0..block.len() {
            for bit in 0..8 {
                let mut b = block;
                b[i] ^= 1 << bit;
                assert_ne!(compute_crc(&b), reference, "flip at byte {} bit {}", i, bit);
            }
        }
    }

    #[test]
    fn stuff_bytes() {
        assert_eq!(encode_byte(0x12).as_slice(), &[0x12]);
        assert_eq!(encode_byte(FRAME_SYNC).as_slice(), &[FRAME_ESC, 0x5e]);
        assert_eq!(encode_byte(FRAME_ESC).as_slice(), &[FRAME_ESC, 0x5d]);

        assert_eq!(decode_byte(0x12, false), (Some(0x12), false));
        assert_eq!(decode_byte(FRAME_ESC, false), (None, true));
        assert_eq!(decode_byte(0x5e, true), (Some(FRAME_SYNC), false));
        assert_eq!(decode_byte(FRAME_ESC, true), (Some(0x5d), false));
    }

    #[test]
    fn frame_round_trip_reserved_bytes() {
        // Place both reserved values at every position of the block
        for reserved in &[FRAME_SYNC, FRAME_ESC] {
            for pos in 0..16 {
                let mut payload = [0x01u8; 16];
                for (i, b) in payload.iter_mut().enumerate().skip(1) {
                    *b = i as u8 * 7;
                }
                payload[pos] = *reserved;

                let frame = Frame::from_payload(LengthClass::Short, &payload).unwrap();

                let mut buff = [0u8; MAX_WIRE_LEN];
                let n = encode_frame(&frame, &mut buff).unwrap();

                // Only the leading sync may appear unescaped
                assert_eq!(buff[0], FRAME_SYNC);
                assert!(!buff[1..n].contains(&FRAME_SYNC));

                let symbols = destuff(&buff[..n]);
                assert_eq!(symbols[0], Symbol::Sync);

                let raw: Vec<u8> = symbols[1..].iter().map(|s| match s {
                    Symbol::Byte(b) => *b,
                    Symbol::Sync => panic!("unexpected sync"),
                }).collect();

                assert_eq!(&raw[..16], frame.as_bytes());
                assert_eq!(BigEndian::read_u16(&raw[16..]), frame.crc());
            }
        }
    }

    #[test]
    fn sync_overrides_escape() {
        let symbols = destuff(&[FRAME_SYNC, 0x01, FRAME_ESC, FRAME_SYNC, 0x5e]);
        assert_eq!(symbols, &[Symbol::Sync, Symbol::Byte(0x01), Symbol::Sync, Symbol::Byte(0x5e)]);
    }

    #[test]
    fn encode_buffer_too_small() {
        let frame = Frame::from_payload(LengthClass::Short, &[0x01]).unwrap();
        let mut buff = [0u8; 10];
        assert_eq!(encode_frame(&frame, &mut buff), Err(Error::BufferTooSmall));
    }
}
