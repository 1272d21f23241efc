//! Simulated RS-485 bus for exercising the link arbiter
//!
//! [`MockSerial`] loops every written byte straight back into the node's own
//! [`Receiver`], as the half-duplex transceiver does on real hardware, and
//! forwards it to any number of listening nodes. Echo corruption, dropped
//! echoes and foreign bus activity can be scheduled per transmission attempt.

use std::vec::Vec;

use crate::codec::{FRAME_ESC, FRAME_SYNC};
use crate::timer::mock::MockTimer;
use crate::timer::Timer;
use crate::Serial;

use super::Receiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MockError {
    /// Byte written with the line driver disabled
    DriverDisabled,
    /// Injected transmit fault
    Fault,
}

/// Loopback serial port for one node
pub struct MockSerial<'a> {
    rx: Receiver<'a>,
    taps: Vec<Receiver<'a>>,

    written: Vec<u8>,
    attempts: usize,
    index: usize,

    corrupt: Vec<(usize, usize)>,
    drop_echo: Vec<usize>,
    collide: Vec<(usize, usize, Vec<u8>)>,
    busy: usize,
    fail: bool,

    driver: bool,
    listening: bool,
    activity_checks: usize,

    timer: Option<MockTimer>,
    sync_times: Vec<u64>,
}

impl <'a> MockSerial<'a> {
    pub fn new(rx: Receiver<'a>) -> Self {
        Self {
            rx,
            taps: Vec::new(),
            written: Vec::new(),
            attempts: 0,
            index: 0,
            corrupt: Vec::new(),
            drop_echo: Vec::new(),
            collide: Vec::new(),
            busy: 0,
            fail: false,
            driver: false,
            listening: false,
            activity_checks: 0,
            timer: None,
            sync_times: Vec::new(),
        }
    }

    /// Record the time of every attempt against a shared mock timer
    pub fn with_timer(mut self, timer: MockTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Attach another node's receiver to the bus
    pub fn add_tap(&mut self, rx: Receiver<'a>) {
        self.taps.push(rx);
    }

    /// Corrupt the echo of wire byte `index` (sync is 0) on attempt `attempt` (from 1)
    pub fn corrupt_echo(&mut self, attempt: usize, index: usize) {
        self.corrupt.push((attempt, index));
    }

    /// Suppress the local echo for attempt `attempt` (from 1)
    pub fn drop_echo(&mut self, attempt: usize) {
        self.drop_echo.push(attempt);
    }

    /// Another node drives `wire` onto the bus right after wire byte `index`
    /// of attempt `attempt`
    pub fn collide_at(&mut self, attempt: usize, index: usize, wire: &[u8]) {
        self.collide.push((attempt, index, wire.to_vec()));
    }

    /// Report bus activity on the next `n` arming of the activity detector
    pub fn busy_for(&mut self, n: usize) {
        self.busy = n;
    }

    /// Fail all subsequent writes
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail = fail;
    }

    /// Feed foreign wire bytes to every node on the bus
    pub fn inject(&mut self, wire: &[u8]) {
        for b in wire {
            self.rx.on_byte(*b);
            for t in self.taps.iter_mut() {
                t.on_byte(*b);
            }
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Number of transmission attempts (sync bytes written)
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn driver_enabled(&self) -> bool {
        self.driver
    }

    pub fn listening(&self) -> bool {
        self.listening
    }

    /// Number of times the activity detector was armed
    pub fn activity_checks(&self) -> usize {
        self.activity_checks
    }

    /// Timestamps (us) of each attempt's sync byte, requires [`MockSerial::with_timer`]
    pub fn sync_times(&self) -> &[u64] {
        &self.sync_times
    }

    pub fn receiver(&self) -> &Receiver<'a> {
        &self.rx
    }

    fn echo_of(&self, b: u8) -> u8 {
        if !self.corrupt.contains(&(self.attempts, self.index)) {
            return b;
        }

        // Corrupt without creating a spurious sync or escape
        match b ^ 0x01 {
            FRAME_SYNC | FRAME_ESC => 0x00,
            c => c,
        }
    }
}

impl <'a> Serial for MockSerial<'a> {
    type Error = MockError;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        if self.fail {
            return Err(MockError::Fault);
        }
        if !self.driver {
            return Err(MockError::DriverDisabled);
        }

        if byte == FRAME_SYNC {
            self.attempts += 1;
            self.index = 0;

            if let Some(t) = &self.timer {
                self.sync_times.push(t.ticks_us());
            }
        }

        self.written.push(byte);

        let echo = self.echo_of(byte);
        let index = self.index;
        self.index += 1;

        if !self.drop_echo.contains(&self.attempts) {
            self.rx.on_byte(echo);
        }
        for t in self.taps.iter_mut() {
            t.on_byte(echo);
        }

        let attempt = self.attempts;
        let foreign = self.collide.iter()
            .find(|(a, i, _)| *a == attempt && *i == index)
            .map(|(_, _, w)| w.clone());
        if let Some(w) = foreign {
            self.inject(&w);
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_driver(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.driver = enabled;
        Ok(())
    }

    fn listen_for_activity(&mut self, armed: bool) -> Result<(), Self::Error> {
        self.listening = armed;

        if armed {
            self.activity_checks += 1;

            if self.busy > 0 {
                self.busy -= 1;
                self.rx.on_edge();
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::{Link, MailboxQueue, RxState};

    #[test]
    fn loopback_echo() {
        let link = Link::default();
        let mut queue = MailboxQueue::new();
        let (producer, _consumer) = queue.split();

        let mut serial = MockSerial::new(Receiver::new(&link, producer));

        assert_eq!(serial.write(FRAME_SYNC), Err(MockError::DriverDisabled));

        serial.set_driver(true).unwrap();
        serial.write(FRAME_SYNC).unwrap();
        serial.write(0x01).unwrap();

        assert_eq!(serial.attempts(), 1);
        assert_eq!(serial.written(), &[FRAME_SYNC, 0x01]);
        assert_eq!(serial.receiver().state(), RxState::Receiving{ index: 1 });
        assert!(link.activity());
    }
}
