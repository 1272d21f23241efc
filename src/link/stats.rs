//! Link statistics
//!
//! Every counter has exactly one writer (either the foreground or the
//! receive interrupt), so updates are a plain load and store rather than a
//! read-modify-write. Counters wrap silently at 16 bits.

use core::sync::atomic::{AtomicU16, Ordering};

use strum::{Display, EnumCount, EnumIter};

/// Statistics counter identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumCount)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Counter {
    /// Frames sent with a verified echo (foreground)
    FramesSent,
    /// Valid frames delivered to the mailbox (receive path)
    FramesReceived,
    /// Echo mismatches, mid-frame syncs and CRC failures (receive path)
    Collisions,
    /// Valid frames dropped because the mailbox was occupied (receive path)
    Overflows,
    /// Transmissions whose echo was not verified in time (foreground)
    EchoTimeouts,
}

const ZERO: AtomicU16 = AtomicU16::new(0);

pub struct Stats {
    counters: [AtomicU16; Counter::COUNT],
}

impl Stats {
    pub const fn new() -> Self {
        Self {
            counters: [ZERO; Counter::COUNT],
        }
    }

    /// Fetch a counter value
    pub fn get(&self, counter: Counter) -> u16 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }

    /// Increment a counter, must only be called by the counter's writer
    pub(crate) fn bump(&self, counter: Counter) {
        let c = &self.counters[counter as usize];
        c.store(c.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn set(&self, counter: Counter, value: u16) {
        self.counters[counter as usize].store(value, Ordering::Relaxed);
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Stats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use strum::IntoEnumIterator;

        let mut m = f.debug_map();
        for c in Counter::iter() {
            m.entry(&c, &self.get(c));
        }
        m.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_wrap() {
        let s = Stats::new();

        s.bump(Counter::Overflows);
        assert_eq!(s.get(Counter::Overflows), 1);
        assert_eq!(s.get(Counter::FramesSent), 0);

        s.set(Counter::FramesSent, u16::MAX);
        s.bump(Counter::FramesSent);
        assert_eq!(s.get(Counter::FramesSent), 0);
    }

    #[test]
    fn counter_names() {
        assert_eq!(std::format!("{}", Counter::EchoTimeouts), "EchoTimeouts");
    }
}
