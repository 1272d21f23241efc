//! CSMA/CD link arbiter
//!
//! The arbiter is split into three parts sharing one [`Link`] context:
//!
//! - [`Sender`], driven from the foreground main loop, owns the outbound
//!   frame and runs carrier sense, transmission, echo verification and backoff.
//! - [`Receiver`], driven from the serial receive (and pin change) interrupt,
//!   assembles inbound frames and checks the echo of our own transmissions.
//! - [`Mailbox`], the application side of a single-slot SPSC queue holding
//!   the last complete frame until it is acknowledged.
//!
//! Everything crossing the interrupt boundary lives in the [`Link`] as an
//! atomic, with exactly one writer per value.
//!
//! ```no_run
//! use ebus_csma::prelude::*;
//! # use ebus_csma::timing::ThreadIdle;
//! # fn run<S: Serial>(serial: S) -> Result<(), Error<S::Error>> {
//! # struct Rng;
//! # impl rand_core::RngCore for Rng {
//! #     fn next_u32(&mut self) -> u32 { 4 }
//! #     fn next_u64(&mut self) -> u64 { 4 }
//! #     fn fill_bytes(&mut self, d: &mut [u8]) { d.fill(4) }
//! #     fn try_fill_bytes(&mut self, d: &mut [u8]) -> Result<(), rand_core::Error> { d.fill(4); Ok(()) }
//! # }
//! let link = Link::new(LinkConfig::default());
//! let mut queue = MailboxQueue::new();
//! let (producer, consumer) = queue.split();
//!
//! // The receiver is handed to the serial interrupt handler
//! let _receiver = Receiver::new(&link, producer);
//! let mut mailbox = Mailbox::new(consumer);
//!
//! let timing = TimingConfig::default();
//! let monitor = Monitor::new(timing, StdTimer::new(), ThreadIdle::new(&timing));
//! let mut sender = Sender::new(&link, serial, monitor, Rng);
//!
//! sender.send_message(&[0x01, 0x00, 0x10, 0x00, 0x20, 0x05])?;
//!
//! if let Some(frame) = mailbox.get_message() {
//!     // handle frame
//!     let _ = frame.as_bytes();
//!     mailbox.message_done();
//! }
//! # Ok(()) }
//! ```

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use heapless::spsc::{Consumer, Queue};

use crate::frame::{Frame, CRC_LEN, MAX_FRAME_LEN};

pub mod config;
pub use config::{Config, MAX_BACKOFF};

pub mod stats;
pub use stats::{Counter, Stats};

pub mod receiver;
pub use receiver::{Receiver, RxState};

pub mod sender;
pub use sender::{backoff_window, Sender};

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

/// Inbound queue depth, one slot (heapless queues hold N - 1 items)
pub const MAILBOX_DEPTH: usize = 2;

/// Backing storage for the single-slot inbound mailbox
pub type MailboxQueue = Queue<Frame, MAILBOX_DEPTH>;

const ECHO_LEN: usize = MAX_FRAME_LEN + CRC_LEN;

const ZERO: AtomicU8 = AtomicU8::new(0);

/// Shared link context, referenced by the sender, receiver and application
pub struct Link {
    config: Config,

    /// Set while the sender expects to hear its own frame
    checking: AtomicBool,
    /// Set by the receive path on collision, cleared by the sender per attempt
    collision: AtomicBool,
    /// Set by the receive path once the whole echo (CRC included) matched
    echo_verified: AtomicBool,
    /// Set on any edge or byte, cleared by the sender when sensing
    activity: AtomicBool,
    /// Set per attempt, the next sync starts our own frame and discards any
    /// partial frame without counting a collision
    resync: AtomicBool,

    /// Wire-order reference of the outbound frame (block then CRC)
    echo: [AtomicU8; ECHO_LEN],

    stats: Stats,
}

impl Link {
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            checking: AtomicBool::new(false),
            collision: AtomicBool::new(false),
            echo_verified: AtomicBool::new(false),
            activity: AtomicBool::new(false),
            resync: AtomicBool::new(false),
            echo: [ZERO; ECHO_LEN],
            stats: Stats::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read a statistics counter
    pub fn stats(&self, counter: Counter) -> u16 {
        self.stats.get(counter)
    }

    /// Full statistics block
    pub fn all_stats(&self) -> &Stats {
        &self.stats
    }

    /// Publish the outbound frame as the echo reference, foreground only
    pub(crate) fn load_echo(&self, frame: &Frame, crc: u16) {
        let block = frame.as_bytes();

        for (i, b) in block.iter().enumerate() {
            self.echo[i].store(*b, Ordering::Relaxed);
        }
        self.echo[block.len()].store((crc >> 8) as u8, Ordering::Relaxed);
        self.echo[block.len() + 1].store(crc as u8, Ordering::Relaxed);
    }

    pub(crate) fn echo_byte(&self, index: usize) -> u8 {
        self.echo[index].load(Ordering::Relaxed)
    }

    /// Enter self-check mode for a new transmission attempt
    pub(crate) fn begin_check(&self) {
        self.collision.store(false, Ordering::Relaxed);
        self.echo_verified.store(false, Ordering::Relaxed);
        self.resync.store(true, Ordering::Relaxed);
        self.checking.store(true, Ordering::Release);
    }

    pub(crate) fn end_check(&self) {
        self.checking.store(false, Ordering::Release);
        self.resync.store(false, Ordering::Release);
    }

    /// Consume a pending resync request, receive path only
    pub(crate) fn take_resync(&self) -> bool {
        self.resync.swap(false, Ordering::AcqRel)
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::Acquire)
    }

    pub(crate) fn flag_collision(&self) {
        self.collision.store(true, Ordering::Release);
        self.stats.bump(Counter::Collisions);
    }

    pub fn collision(&self) -> bool {
        self.collision.load(Ordering::Acquire)
    }

    pub(crate) fn confirm_echo(&self) {
        self.echo_verified.store(true, Ordering::Release);
    }

    pub fn echo_verified(&self) -> bool {
        self.echo_verified.load(Ordering::Acquire)
    }

    pub(crate) fn note_activity(&self) {
        self.activity.store(true, Ordering::Release);
    }

    pub fn activity(&self) -> bool {
        self.activity.load(Ordering::Acquire)
    }

    pub(crate) fn clear_activity(&self) {
        self.activity.store(false, Ordering::Release);
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl core::fmt::Debug for Link {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Link")
            .field("config", &self.config)
            .field("checking", &self.is_checking())
            .field("collision", &self.collision())
            .field("echo_verified", &self.echo_verified())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Application side of the inbound mailbox
pub struct Mailbox<'a> {
    consumer: Consumer<'a, Frame, MAILBOX_DEPTH>,
}

impl <'a> Mailbox<'a> {
    pub fn new(consumer: Consumer<'a, Frame, MAILBOX_DEPTH>) -> Self {
        Self { consumer }
    }

    /// Fetch the pending frame without consuming it
    pub fn get_message(&self) -> Option<&Frame> {
        self.consumer.peek()
    }

    /// Release the pending frame so the receive path may deliver the next one
    pub fn message_done(&mut self) {
        let _ = self.consumer.dequeue();
    }
}
