//! Elektor-Bus link layer prelude
//
// Derived from https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub use crate::Serial;

pub use crate::error::{Error, FrameError};

pub use crate::frame::{Frame, LengthClass, ProtocolId, ProtocolType};

pub use crate::codec::{compute_crc, encode_frame, Destuffer, Symbol, WireBytes};

pub use crate::timer::Timer;
#[cfg(feature = "std")]
pub use crate::timer::StdTimer;

pub use crate::timing::{BitRate, Idle, Monitor, TimingConfig};

pub use crate::link::{Config as LinkConfig, Counter, Link, Mailbox, MailboxQueue, Receiver, Sender};

pub use crate::protocol::{Header, Message, NodeId};

pub use crate::dump::{Event as DumpEvent, FrameDecoder};
