//! Interrupt-side receive path
//!
//! Fed one wire byte at a time from the serial receive interrupt. Frames are
//! assembled in a private buffer and only handed to the mailbox once the CRC
//! has been verified.

use byteorder::{BigEndian, ByteOrder};
use heapless::spsc::Producer;

use crate::codec::{Crc16, Destuffer, Symbol};
use crate::frame::{Frame, LengthClass, CRC_LEN};
use crate::log::{debug, trace, warn};

use super::{Counter, Link, MAILBOX_DEPTH};

/// Receive path states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    /// Waiting for a sync byte
    Listening,
    /// Assembling a frame from another node, `index` logical bytes received
    Receiving { index: usize },
    /// Comparing our own transmission, `index` logical bytes verified
    SelfCheck { index: usize },
    /// Ignoring the rest of the current frame until the next sync
    Discarding,
}

impl RxState {
    /// A frame has been started and not yet completed
    pub fn mid_frame(&self) -> bool {
        matches!(self, RxState::Receiving{..} | RxState::SelfCheck{..})
    }
}

/// Receive path of the link arbiter
pub struct Receiver<'a> {
    link: &'a Link,
    producer: Producer<'a, Frame, MAILBOX_DEPTH>,

    class: LengthClass,
    state: RxState,
    destuffer: Destuffer,

    frame: Frame,
    crc: Crc16,
    rx_crc: [u8; CRC_LEN],
}

impl <'a> Receiver<'a> {
    pub fn new(link: &'a Link, producer: Producer<'a, Frame, MAILBOX_DEPTH>) -> Self {
        let class = link.config().length_class;

        Self {
            link,
            producer,
            class,
            state: RxState::Listening,
            destuffer: Destuffer::new(),
            frame: Frame::zeroed(class),
            crc: Crc16::new(),
            rx_crc: [0u8; CRC_LEN],
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Pin change interrupt on the receive line
    pub fn on_edge(&mut self) {
        self.link.note_activity();
    }

    /// Serial receive interrupt, called with each received wire byte
    pub fn on_byte(&mut self, wire: u8) {
        self.link.note_activity();

        match self.destuffer.push(wire) {
            Some(Symbol::Sync) => self.on_sync(),
            Some(Symbol::Byte(b)) => self.on_data(b),
            None => (),
        }
    }

    fn on_sync(&mut self) {
        // The first sync of our own attempt drops any stale partial frame
        let own_start = self.link.take_resync();

        // Otherwise a sync always starts a new frame, a partial one means
        // another transmitter started over us (or the previous frame was short)
        if self.state.mid_frame() && !own_start {
            debug!("Sync mid-frame in state {:?}, collision", self.state);
            self.link.flag_collision();
        }

        self.frame = Frame::zeroed(self.class);
        self.crc.reset();

        self.state = match self.link.is_checking() {
            true => RxState::SelfCheck{ index: 0 },
            false => RxState::Receiving{ index: 0 },
        };
    }

    fn on_data(&mut self, b: u8) {
        match self.state {
            RxState::Listening | RxState::Discarding => (),
            RxState::SelfCheck{ index } => self.check_echo(index, b),
            RxState::Receiving{ index } => self.receive(index, b),
        }
    }

    fn check_echo(&mut self, index: usize, b: u8) {
        let expected = self.link.echo_byte(index);

        if b != expected {
            debug!("Echo mismatch at {} (sent: {}, heard: {})", index, expected, b);
            self.link.flag_collision();
            self.state = RxState::Discarding;
            return;
        }

        if index + 1 < self.class.wire_len() {
            self.state = RxState::SelfCheck{ index: index + 1 };
            return;
        }

        trace!("Echo verified");
        self.link.confirm_echo();
        self.state = RxState::Listening;
    }

    fn receive(&mut self, index: usize, b: u8) {
        let len = self.class.len();

        // Frames of other length classes are not for us, and not an error
        if index == 0 && LengthClass::of_protocol_id(b) != Some(self.class) {
            trace!("Ignoring frame with protocol id {}", b);
            self.state = RxState::Discarding;
            return;
        }

        if index < len {
            self.frame.as_bytes_mut()[index] = b;
            self.crc.update(b);
        } else {
            self.rx_crc[index - len] = b;
        }

        if index + 1 < self.class.wire_len() {
            self.state = RxState::Receiving{ index: index + 1 };
            return;
        }

        self.state = RxState::Listening;

        let received = BigEndian::read_u16(&self.rx_crc);
        if received != self.crc.value {
            debug!("CRC error (computed: {}, received: {})", self.crc.value, received);
            self.link.flag_collision();
            return;
        }

        self.deliver();
    }

    fn deliver(&mut self) {
        match self.producer.enqueue(self.frame.clone()) {
            Ok(()) => {
                trace!("Frame ready: {:?}", self.frame);
                self.link.stats.bump(Counter::FramesReceived);
            },
            Err(_f) => {
                warn!("Mailbox full, dropping received frame");
                self.link.stats.bump(Counter::Overflows);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::vec::Vec;

    use super::*;
    use crate::codec::{encode_byte, encode_frame, FRAME_SYNC, MAX_WIRE_LEN};
    use crate::link::{Config, Mailbox, MailboxQueue};

    fn wire(payload: &[u8]) -> Vec<u8> {
        let frame = Frame::from_payload(LengthClass::Short, payload).unwrap();
        let mut buff = [0u8; MAX_WIRE_LEN];
        let n = encode_frame(&frame, &mut buff).unwrap();
        buff[..n].to_vec()
    }

    fn feed(rx: &mut Receiver, data: &[u8]) {
        for b in data {
            rx.on_byte(*b);
        }
    }

    fn sample() -> [u8; 16] {
        let mut p = [0u8; 16];
        p[..6].copy_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        p
    }

    #[test]
    fn receive_scenario() {
        let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, simplelog::Config::default());

        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);
        let mailbox = Mailbox::new(consumer);

        let payload = sample();
        let crc = crate::codec::compute_crc(&payload);

        // 7E 01 02 03 04 05 06 00x10 <crc_hi> <crc_lo>
        let mut data = std::vec![FRAME_SYNC];
        data.extend_from_slice(&payload);
        data.extend_from_slice(encode_byte((crc >> 8) as u8).as_slice());
        data.extend_from_slice(encode_byte(crc as u8).as_slice());

        feed(&mut rx, &data);

        let frame = mailbox.get_message().unwrap();
        assert_eq!(frame.as_bytes(), &payload[..]);
        assert_eq!(frame.crc(), crc);
        assert_eq!(rx.state(), RxState::Listening);

        assert_eq!(link.stats(Counter::FramesReceived), 1);
        assert_eq!(link.stats(Counter::Collisions), 0);
        assert_eq!(link.stats(Counter::Overflows), 0);
    }

    #[test]
    fn resync_mid_frame() {
        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);
        let mailbox = Mailbox::new(consumer);

        let first = wire(&[0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0xee]);
        let second = wire(&sample());

        // Truncate the first frame and start the second over it
        feed(&mut rx, &first[..7]);
        feed(&mut rx, &second);

        assert_eq!(mailbox.get_message().unwrap().as_bytes(), &sample()[..]);
        assert_eq!(link.stats(Counter::FramesReceived), 1);
        assert_eq!(link.stats(Counter::Collisions), 1);
    }

    #[test]
    fn crc_error_discarded() {
        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);
        let mailbox = Mailbox::new(consumer);

        let mut data = wire(&sample());
        data[3] ^= 0x01;

        feed(&mut rx, &data);

        assert!(mailbox.get_message().is_none());
        assert_eq!(link.stats(Counter::Collisions), 1);
        assert_eq!(link.stats(Counter::FramesReceived), 0);

        // Recovers on the next sync
        feed(&mut rx, &wire(&sample()));
        assert!(mailbox.get_message().is_some());
    }

    #[test]
    fn foreign_length_class_ignored() {
        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);
        let mailbox = Mailbox::new(consumer);

        // 32 byte debug frame
        let frame = Frame::from_payload(LengthClass::Medium, &[0x5f, 0x01, 0x02]).unwrap();
        let mut buff = [0u8; MAX_WIRE_LEN];
        let n = encode_frame(&frame, &mut buff).unwrap();

        feed(&mut rx, &buff[..n]);
        assert_eq!(rx.state(), RxState::Discarding);

        feed(&mut rx, &wire(&sample()));

        assert_eq!(mailbox.get_message().unwrap().as_bytes(), &sample()[..]);
        assert_eq!(link.stats(Counter::Collisions), 0);
        assert_eq!(link.stats(Counter::FramesReceived), 1);
    }

    #[test]
    fn overflow_keeps_first_frame() {
        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);
        let mut mailbox = Mailbox::new(consumer);

        let first = [0x01, 0x11, 0x22];
        let second = [0x01, 0x33, 0x44];

        feed(&mut rx, &wire(&first));
        feed(&mut rx, &wire(&second));

        assert_eq!(link.stats(Counter::Overflows), 1);
        assert_eq!(link.stats(Counter::FramesReceived), 1);
        assert_eq!(&mailbox.get_message().unwrap().as_bytes()[..3], &first[..]);

        // Acknowledge and receive again
        mailbox.message_done();
        feed(&mut rx, &wire(&second));

        assert_eq!(&mailbox.get_message().unwrap().as_bytes()[..3], &second[..]);
        assert_eq!(link.stats(Counter::Overflows), 1);
        assert_eq!(link.stats(Counter::FramesReceived), 2);
    }

    #[test]
    fn self_check_mismatch() {
        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);
        let mailbox = Mailbox::new(consumer);

        let frame = Frame::from_payload(LengthClass::Short, &sample()).unwrap();
        link.load_echo(&frame, frame.crc());
        link.begin_check();

        let mut data = wire(&sample());
        data[4] ^= 0x40;

        feed(&mut rx, &data[..5]);

        assert!(link.collision());
        assert!(!link.echo_verified());
        assert_eq!(rx.state(), RxState::Discarding);
        assert_eq!(link.stats(Counter::Collisions), 1);

        // Own frames never reach the mailbox
        assert!(mailbox.get_message().is_none());
    }

    #[test]
    fn self_check_verified() {
        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);
        let mailbox = Mailbox::new(consumer);

        let frame = Frame::from_payload(LengthClass::Short, &sample()).unwrap();
        link.load_echo(&frame, frame.crc());
        link.begin_check();

        feed(&mut rx, &wire(&sample()));

        assert!(link.echo_verified());
        assert!(!link.collision());
        assert!(mailbox.get_message().is_none());
        assert_eq!(link.stats(Counter::FramesReceived), 0);
    }

    #[test]
    fn own_sync_drops_partial_frame() {
        let link = Link::new(Config::default());
        let mut queue = MailboxQueue::new();
        let (producer, _consumer) = queue.split();
        let mut rx = Receiver::new(&link, producer);

        // Stale partial frame left on the bus
        feed(&mut rx, &[FRAME_SYNC, 0x01, 0x02]);
        assert_eq!(rx.state(), RxState::Receiving{ index: 2 });

        let frame = Frame::from_payload(LengthClass::Short, &sample()).unwrap();
        link.load_echo(&frame, frame.crc());
        link.begin_check();

        feed(&mut rx, &wire(&sample()));

        assert!(link.echo_verified());
        assert!(!link.collision());
        assert_eq!(link.stats(Counter::Collisions), 0);

        // Outside our own attempt a mid-frame sync is still a collision
        link.end_check();
        feed(&mut rx, &[FRAME_SYNC, 0x01, FRAME_SYNC]);
        assert_eq!(link.stats(Counter::Collisions), 1);
    }
}
