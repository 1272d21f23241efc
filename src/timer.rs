//! Link Timer API
//
// Derived from https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Monotonic time sources used to pace the link layer

/// Timer trait provides mechanisms for accessing monotonic times
/// to assist with protocol implementations.
///
/// All methods are monotonic and relative to the same unknown epoc
pub trait Timer {
    /// Returns the number of millisecond ticks since some unknown epoc
    fn ticks_ms(&self) -> u64;

    /// Returns the number of microsecond ticks since some unknown epoc
    fn ticks_us(&self) -> u64;
}

/// Timer backed by [`std::time::Instant`] for hosted use
#[cfg(feature = "std")]
#[derive(Clone, Debug)]
pub struct StdTimer {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdTimer {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Timer for StdTimer {
    fn ticks_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn ticks_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};

    /// Mock timer implementation to assist with testing,
    /// clones share the same time value
    #[derive(Clone, Debug)]
    pub struct MockTimer(Arc<Mutex<u64>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(0)))
        }

        pub fn set_ms(&mut self, val: u32) {
            *self.0.lock().unwrap() = val as u64 * 1000;
        }

        pub fn set_us(&mut self, val: u64) {
            *self.0.lock().unwrap() = val;
        }

        /// Advance time by `us` microseconds
        pub fn advance_us(&self, us: u64) {
            let mut v = self.0.lock().unwrap();
            *v += us;
        }

        pub fn inc(&mut self) {
            self.advance_us(1000);
        }

        pub fn val(&self) -> u32 {
            (*self.0.lock().unwrap() / 1000) as u32
        }
    }

    impl Default for MockTimer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl super::Timer for MockTimer {
        fn ticks_ms(&self) -> u64 {
            let v = self.0.lock().unwrap();
            *v / 1000
        }

        fn ticks_us(&self) -> u64 {
            let v = self.0.lock().unwrap();
            *v
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockTimer;
    use super::Timer;

    #[test]
    fn mock_timer_shared() {
        let mut a = MockTimer::new();
        let b = a.clone();

        a.set_ms(3);
        assert_eq!(b.ticks_ms(), 3);
        assert_eq!(b.ticks_us(), 3000);

        b.advance_us(250);
        assert_eq!(a.ticks_us(), 3250);
        assert_eq!(a.val(), 3);
    }
}
