//! Foreground transmit path
//!
//! Carrier sense, transmission with byte-wise collision abort, self-echo
//! verification and randomized exponential backoff. Retries are unbounded,
//! [`Sender::send_message`] only returns on success or on a serial fault.

use rand_core::RngCore;

use crate::codec::WireBytes;
use crate::error::Error;
use crate::frame::Frame;
use crate::log::{debug, trace};
use crate::timer::Timer;
use crate::timing::{Idle, Monitor};
use crate::Serial;

use super::{Counter, Link, MAX_BACKOFF};

/// Backoff window in octet-times for a given backoff count
pub fn backoff_window(backoff: u8) -> u32 {
    1 << (backoff.min(MAX_BACKOFF) / 2)
}

/// Draw a random backoff delay in `[1, backoff_window(backoff)]` octet-times
pub fn backoff_octets<R: RngCore>(rng: &mut R, backoff: u8) -> u32 {
    1 + rng.next_u32() % backoff_window(backoff)
}

/// Transmit side of the link arbiter, one per [`Link`]
pub struct Sender<'a, S, T, I, R> {
    link: &'a Link,
    serial: S,
    monitor: Monitor<T, I>,
    rng: R,
}

impl <'a, S, T, I, R> Sender<'a, S, T, I, R>
where
    S: Serial,
    T: Timer,
    I: Idle,
    R: RngCore,
{
    pub fn new(link: &'a Link, serial: S, monitor: Monitor<T, I>, rng: R) -> Self {
        Self { link, serial, monitor, rng }
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn monitor(&self) -> &Monitor<T, I> {
        &self.monitor
    }

    /// Send a payload, blocking until it has been transmitted without collision.
    ///
    /// The payload (PROTOCOL_ID first) is zero-padded to the configured
    /// frame length.
    pub fn send_message(&mut self, payload: &[u8]) -> Result<(), Error<S::Error>> {
        let class = self.link.config().length_class;
        let frame = Frame::from_payload(class, payload).map_err(Error::widen)?;
        let crc = frame.crc();

        self.link.load_echo(&frame, crc);

        let mut backoff = 0u8;

        loop {
            self.wait_bus_idle()?;

            if self.try_transmit(&frame, crc)? {
                debug!("Frame sent (crc: {})", crc);
                self.link.stats.bump(Counter::FramesSent);
                return Ok(());
            }

            backoff = (backoff + 1).min(MAX_BACKOFF);
            self.backoff(backoff)?;
        }
    }

    /// Check the bus stays quiet for the configured idle period
    pub fn bus_idle(&mut self) -> Result<bool, Error<S::Error>> {
        let link = self.link;
        let octets = link.config().idle_octets;

        link.clear_activity();
        self.serial.listen_for_activity(true).map_err(Error::Serial)?;

        self.monitor.reset();
        self.monitor.wait_until(|c| link.activity() || c.octets_elapsed(octets));

        self.serial.listen_for_activity(false).map_err(Error::Serial)?;

        Ok(!link.activity())
    }

    fn wait_bus_idle(&mut self) -> Result<(), Error<S::Error>> {
        while !self.bus_idle()? {
            trace!("Bus busy, deferring");
        }
        Ok(())
    }

    fn backoff(&mut self, backoff: u8) -> Result<(), Error<S::Error>> {
        self.wait_bus_idle()?;

        loop {
            let octets = backoff_octets(&mut self.rng, backoff);
            debug!("Backoff {} for {} octets", backoff, octets);

            self.monitor.wait_octets(octets);

            if self.bus_idle()? {
                return Ok(());
            }
        }
    }

    /// Single transmission attempt, returns true once the echo was verified
    fn try_transmit(&mut self, frame: &Frame, crc: u16) -> Result<bool, Error<S::Error>> {
        self.link.begin_check();

        let res = self.transmit(frame, crc);

        self.link.end_check();

        res
    }

    fn transmit(&mut self, frame: &Frame, crc: u16) -> Result<bool, Error<S::Error>> {
        self.serial.set_driver(true).map_err(Error::Serial)?;

        let written = self.write_frame(frame, crc);
        let disabled = self.serial.set_driver(false).map_err(Error::Serial);

        let complete = written?;
        disabled?;

        if !complete {
            debug!("Collision during transmit, aborted");
            return Ok(false);
        }

        let link = self.link;
        let timeout = link.config().echo_timeout_octets;

        self.monitor.reset();
        self.monitor.wait_until(|c| {
            link.echo_verified() || link.collision() || c.octets_elapsed(timeout)
        });

        if link.echo_verified() {
            return Ok(true);
        }

        if !link.collision() {
            debug!("Echo timeout after {} octets", timeout);
            link.stats.bump(Counter::EchoTimeouts);
        }

        Ok(false)
    }

    /// Write the wire image, returns false if aborted on collision
    fn write_frame(&mut self, frame: &Frame, crc: u16) -> Result<bool, Error<S::Error>> {
        for b in WireBytes::new(frame, crc) {
            if self.link.collision() {
                return Ok(false);
            }
            self.serial.write(b).map_err(Error::Serial)?;
        }

        self.serial.flush().map_err(Error::Serial)?;

        Ok(true)
    }
}
