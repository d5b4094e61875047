//! Serial link transport.
//!
//! Owns the serial endpoint and exposes the two operations the state
//! machines need: a non-blocking single-byte read and a whole-frame write.
//! Read-side hiccups are logged and absorbed here; the protocol is
//! self-healing because peers re-send linkready on silence.

use crate::constants::{BAUD_RATE, READ_TIMEOUT_MS};
use crate::error::Result;
use log::warn;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

/// Byte-stream seam between the state machines and the serial device, so the
/// engine can be driven from an in-memory bus in tests.
pub trait Bus {
    /// Return one received byte, or `None` when nothing is currently
    /// available. Transient read errors are absorbed (logged) here.
    fn read_byte(&mut self) -> Option<u8>;

    /// Write one complete, already-escaped frame.
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
}

/// The real RS-485 endpoint: 9600 8N1, raw, no flow control. Would-block
/// reads are emulated with a short receive timeout.
pub struct SerialBus {
    port: Box<dyn SerialPort>,
}

impl SerialBus {
    /// Open the RS-485 endpoint.
    ///
    /// # Arguments
    /// * `path` - Serial device name (e.g., "COM3" on Windows, "/dev/ttyUSB0" on Linux)
    ///
    /// # Errors
    /// Returns error if the device cannot be opened or configured. This is
    /// the only unrecoverable failure in the system.
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// List available serial ports on the system.
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }
}

impl Bus for SerialBus {
    fn read_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            Ok(n) => {
                warn!("Serial read returned {} bytes, ignoring", n);
                None
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => None,
            Err(e) if e.kind() == ErrorKind::Interrupted => None,
            Err(e) => {
                warn!("Serial read error, continuing: {}", e);
                None
            }
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        Ok(())
    }
}

/// In-memory bus for driving the state machines in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct TestBus {
    pub rx: std::collections::VecDeque<u8>,
    pub tx: Vec<Vec<u8>>,
}

#[cfg(test)]
impl TestBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes for the engine to read.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Frames the engine wrote, oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.tx
    }
}

#[cfg(test)]
impl Bus for TestBus {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.tx.push(frame.to_vec());
        Ok(())
    }
}
