//! Elektor-Bus monitor
//!
//! Decodes a raw bus capture, either from a file or live from a serial port,
//! printing every frame and error seen on the bus.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use structopt::StructOpt;

use ebus_csma::prelude::*;
use ebus_csma::protocol;

#[derive(Debug, StructOpt)]
struct Options {
    #[structopt(long, conflicts_with = "port", required_unless = "port")]
    /// Raw capture file to decode
    pub file: Option<PathBuf>,

    #[structopt(long)]
    /// Serial port to capture from
    pub port: Option<String>,

    #[structopt(long, default_value = "9600")]
    /// Serial port bit rate
    pub baud: u32,

    #[structopt(long)]
    /// Decode BusControl / H61 headers of 16 byte frames
    pub headers: bool,

    #[structopt(long, default_value = "info")]
    /// Configure log level
    pub log_level: simplelog::LevelFilter,
}

fn open(opts: &Options) -> anyhow::Result<Box<dyn Read>> {
    if let Some(f) = &opts.file {
        debug!("Opening capture {}", f.display());
        return Ok(Box::new(File::open(f)?));
    }

    let port = match &opts.port {
        Some(p) => p,
        None => return Err(anyhow::anyhow!("No capture file or serial port provided")),
    };

    debug!("Opening {} at {} baud", port, opts.baud);

    let p = serialport::new(port, opts.baud)
        .timeout(Duration::from_millis(100))
        .open()?;

    Ok(Box::new(p))
}

fn show(opts: &Options, event: &DumpEvent) {
    match event {
        DumpEvent::Frame(f) => {
            let id = f.protocol_id();

            info!("{:?} ({:?}): {:02x?}", ProtocolType::from(id), f.class(), f.as_bytes());

            if opts.headers && f.class() == LengthClass::Short {
                match Header::decode(f) {
                    Ok(h) => info!("  {:?} data: {:02x?}", h, protocol::data(f)),
                    Err(e) => warn!("  header decode error: {:?}", e),
                }
            }
        },
        DumpEvent::CrcError{ expected, received } => {
            warn!("CRC error (expected: {:04x}, received: {:04x})", expected, received);
        },
        DumpEvent::Truncated{ received } => {
            warn!("Truncated frame after {} bytes", received);
        },
        DumpEvent::UnknownClass(id) => {
            warn!("Unknown length class (protocol id: {:02x})", id);
        },
    }
}

fn main() -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Bind exit handler
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    // Load options
    let opts = Options::from_args();

    // Initialise logging
    let _ = simplelog::SimpleLogger::init(opts.log_level, simplelog::Config::default());

    info!("Starting ebusdump");

    let mut input = open(&opts)?;
    let mut decoder = FrameDecoder::new();
    let mut buff = [0u8; 256];

    while running.load(Ordering::SeqCst) {
        let n = match input.read(&mut buff) {
            Ok(0) if opts.file.is_some() => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        for b in &buff[..n] {
            if let Some(event) = decoder.push(*b) {
                show(&opts, &event);
            }
        }
    }

    let stats = decoder.stats();
    info!(
        "Frames: {} CRC errors: {} truncated: {} unknown class: {}",
        stats.frames, stats.crc_errors, stats.truncated, stats.unknown_class
    );

    Ok(())
}
