//! Timing monitor
//!
//! Paces the link layer in octet-times (10 bit-times at 8-N-1) and provides
//! the one blocking primitive, [`Monitor::wait_until`], which sleeps between
//! interrupts instead of spinning.

use crate::timer::Timer;

/// Bits on the wire per octet (start, 8 data, stop)
pub const BITS_PER_OCTET: u32 = 10;

/// Supported serial bit rates
///
/// Other rates are deliberately unrepresentable so misconfiguration
/// cannot produce incorrect timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BitRate {
    /// Bits per second
    pub const fn bps(self) -> u32 {
        match self {
            BitRate::B9600 => 9_600,
            BitRate::B19200 => 19_200,
            BitRate::B38400 => 38_400,
            BitRate::B57600 => 57_600,
            BitRate::B115200 => 115_200,
        }
    }

    /// Octet time in microseconds, rounded up
    pub const fn octet_time_us(self) -> u32 {
        (BITS_PER_OCTET * 1_000_000 + self.bps() - 1) / self.bps()
    }
}

/// Timing configuration for a node's octet timer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingConfig {
    /// Input clock of the hardware timer in Hz (after prescaling).
    ///
    /// Only sizes the compare value returned by [`TimingConfig::octet_ticks`]
    /// and its range check, the [`Monitor`] measures octet-times in
    /// microseconds from the bit rate alone.
    pub timer_clock_hz: u32,

    /// Serial bit rate
    pub bit_rate: BitRate,
}

impl TimingConfig {
    /// Largest compare value of the 16-bit octet timer
    pub const MAX_COMPARE: u32 = 0xffff;

    /// Create a timing configuration.
    ///
    /// Panics if one octet-time does not fit the compare register or is
    /// shorter than one timer tick, which fails compilation when used to
    /// initialise a `const`.
    pub const fn new(timer_clock_hz: u32, bit_rate: BitRate) -> Self {
        let ticks = (timer_clock_hz as u64 * BITS_PER_OCTET as u64) / bit_rate.bps() as u64;

        assert!(ticks > 0, "octet time shorter than one timer tick");
        assert!(ticks <= Self::MAX_COMPARE as u64, "octet time exceeds timer compare range");

        Self { timer_clock_hz, bit_rate }
    }

    /// Timer ticks per octet, as loaded into the compare register by node
    /// firmware driving a hardware octet timer
    pub const fn octet_ticks(&self) -> u32 {
        ((self.timer_clock_hz as u64 * BITS_PER_OCTET as u64) / self.bit_rate.bps() as u64) as u32
    }

    pub const fn octet_time_us(&self) -> u32 {
        self.bit_rate.octet_time_us()
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::new(1_000_000, BitRate::B9600)
    }
}

/// Low-power idle primitive
pub trait Idle {
    /// Sleep until the next interrupt unless `ready` returns true.
    ///
    /// Implementations evaluate `ready` with interrupts masked and enter sleep
    /// in the same atomic sequence, so a wakeup between the check and the
    /// sleep cannot be lost.
    fn idle_unless(&mut self, ready: &dyn Fn() -> bool);
}

/// Octet clock state, readable by wait predicates
#[derive(Debug, Clone)]
pub struct OctetClock<T> {
    timer: T,
    octet_us: u64,
    start_us: u64,
}

impl <T: Timer> OctetClock<T> {
    /// Restart counting from zero
    pub fn reset(&mut self) {
        self.start_us = self.timer.ticks_us();
    }

    /// True once one octet-time has passed since the last reset
    pub fn octet_time_elapsed(&self) -> bool {
        self.octets_elapsed(1)
    }

    /// True once `n` octet-times have passed since the last reset
    pub fn octets_elapsed(&self, n: u32) -> bool {
        let elapsed = self.timer.ticks_us().saturating_sub(self.start_us);
        elapsed >= self.octet_us * n as u64
    }

    pub fn octet_us(&self) -> u64 {
        self.octet_us
    }
}

/// Timing monitor, combining an octet clock with the idle primitive
pub struct Monitor<T, I> {
    clock: OctetClock<T>,
    idle: I,
}

impl <T: Timer, I: Idle> Monitor<T, I> {
    pub fn new(config: TimingConfig, timer: T, idle: I) -> Self {
        let start_us = timer.ticks_us();

        Self {
            clock: OctetClock {
                timer,
                octet_us: config.octet_time_us() as u64,
                start_us,
            },
            idle,
        }
    }

    pub fn reset(&mut self) {
        self.clock.reset()
    }

    pub fn octet_time_elapsed(&self) -> bool {
        self.clock.octet_time_elapsed()
    }

    pub fn octets_elapsed(&self, n: u32) -> bool {
        self.clock.octets_elapsed(n)
    }

    pub fn clock(&self) -> &OctetClock<T> {
        &self.clock
    }

    /// Sleep until `predicate` holds, re-evaluating after every wake-up
    pub fn wait_until<F>(&mut self, predicate: F)
    where
        F: Fn(&OctetClock<T>) -> bool,
    {
        let Self { clock, idle } = self;

        while !predicate(clock) {
            idle.idle_unless(&|| predicate(clock));
        }
    }

    /// Reset and wait for `n` octet-times
    pub fn wait_octets(&mut self, n: u32) {
        self.reset();
        self.wait_until(|c| c.octets_elapsed(n));
    }
}

/// Idle primitive for hosted use, parks the thread for a fraction of an octet
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct ThreadIdle {
    pub interval: std::time::Duration,
}

#[cfg(feature = "std")]
impl ThreadIdle {
    pub fn new(config: &TimingConfig) -> Self {
        Self {
            interval: std::time::Duration::from_micros(config.octet_time_us() as u64 / 4 + 1),
        }
    }
}

#[cfg(feature = "std")]
impl Idle for ThreadIdle {
    fn idle_unless(&mut self, ready: &dyn Fn() -> bool) {
        if !ready() {
            std::thread::sleep(self.interval);
        }
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::timer::mock::MockTimer;

    /// Mock idle primitive, every sleep advances the shared mock timer
    #[derive(Clone, Debug)]
    pub struct MockIdle {
        timer: MockTimer,
        step_us: u64,
        sleeps: Arc<AtomicUsize>,
    }

    impl MockIdle {
        pub fn new(timer: MockTimer, step_us: u64) -> Self {
            Self {
                timer,
                step_us,
                sleeps: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Number of times the idle primitive actually slept
        pub fn sleeps(&self) -> usize {
            self.sleeps.load(Ordering::SeqCst)
        }
    }

    impl super::Idle for MockIdle {
        fn idle_unless(&mut self, ready: &dyn Fn() -> bool) {
            if !ready() {
                self.sleeps.fetch_add(1, Ordering::SeqCst);
                self.timer.advance_us(self.step_us);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use super::mock::MockIdle;
    use crate::timer::mock::MockTimer;

    #[test]
    fn octet_times() {
        assert_eq!(BitRate::B9600.octet_time_us(), 1042);
        assert_eq!(BitRate::B19200.octet_time_us(), 521);
        assert_eq!(BitRate::B115200.octet_time_us(), 87);

        const CFG: TimingConfig = TimingConfig::new(250_000, BitRate::B9600);
        assert_eq!(CFG.octet_ticks(), 260);
    }

    #[test]
    #[should_panic]
    fn compare_overflow() {
        let _ = TimingConfig::new(100_000_000, BitRate::B9600);
    }

    #[test]
    fn octet_time_independent_of_timer_clock() {
        let timer = MockTimer::new();

        let slow = Monitor::new(TimingConfig::new(250_000, BitRate::B9600), timer.clone(), MockIdle::new(timer.clone(), 10));
        let fast = Monitor::new(TimingConfig::new(1_000_000, BitRate::B9600), timer.clone(), MockIdle::new(timer.clone(), 10));

        assert_eq!(slow.clock().octet_us(), 1042);
        assert_eq!(fast.clock().octet_us(), 1042);

        assert_eq!(TimingConfig::new(250_000, BitRate::B9600).octet_ticks(), 260);
        assert_eq!(TimingConfig::new(1_000_000, BitRate::B9600).octet_ticks(), 1041);
    }

    #[test]
    fn octet_elapsed() {
        let timer = MockTimer::new();
        let idle = MockIdle::new(timer.clone(), 10);
        let mut m = Monitor::new(TimingConfig::new(1_000_000, BitRate::B9600), timer.clone(), idle);

        m.reset();
        assert!(!m.octet_time_elapsed());

        timer.advance_us(1041);
        assert!(!m.octet_time_elapsed());

        timer.advance_us(1);
        assert!(m.octet_time_elapsed());
        assert!(!m.octets_elapsed(2));

        m.reset();
        assert!(!m.octet_time_elapsed());
    }

    #[test]
    fn wait_until_sleeps() {
        let timer = MockTimer::new();
        let idle = MockIdle::new(timer.clone(), 100);
        let mut m = Monitor::new(TimingConfig::new(1_000_000, BitRate::B9600), timer.clone(), idle.clone());

        m.wait_octets(2);

        assert!(m.octets_elapsed(2));
        // 2084us in 100us steps
        assert_eq!(idle.sleeps(), 21);

        // Satisfied predicates do not sleep
        m.wait_until(|_| true);
        assert_eq!(idle.sleeps(), 21);
    }
}
