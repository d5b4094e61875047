//! Protocol constants for TWC master/slave communication.
//!
//! This module defines all the constants used on the RS-485 bus, including
//! frame markers, message type bytes, timing parameters and the allocation
//! policy thresholds.

use std::time::Duration;

/// Frame start marker and first byte of the terminator
pub const FRAME_MARK: u8 = 0xC0;

/// Second byte of the frame terminator (`C0 FE`)
pub const FRAME_END: u8 = 0xFE;

/// Escape introducer inside a frame body
pub const ESCAPE: u8 = 0xDB;

/// Escaped form of `0xC0` is `DB DC`
pub const ESCAPE_MARK: u8 = 0xDC;

/// Escaped form of `0xDB` is `DB DD`
pub const ESCAPE_ESCAPE: u8 = 0xDD;

/// Unescaped frame length including markers
pub const FRAME_LEN: usize = 17;

/// Unescaped body length: type(2) + sender(2) + slot(2) + payload(7) + checksum(1)
pub const BODY_LEN: usize = 14;

/// Message type bytes
pub const TYPE_MASTER_LINKREADY1: [u8; 2] = [0xFC, 0xE1];
pub const TYPE_MASTER_LINKREADY2: [u8; 2] = [0xFB, 0xE2];
pub const TYPE_MASTER_HEARTBEAT: [u8; 2] = [0xFB, 0xE0];
pub const TYPE_SLAVE_LINKREADY: [u8; 2] = [0xFD, 0xE2];
pub const TYPE_SLAVE_HEARTBEAT: [u8; 2] = [0xFD, 0xE0];
pub const TYPE_MASTER_IDLE_4H: [u8; 2] = [0xFC, 0x1D];

/// Baud rate (9600 bps, 8N1)
pub const BAUD_RATE: u32 = 9600;

/// Serial read timeout; doubles as the scheduler's idle backoff
pub const READ_TIMEOUT_MS: u64 = 1;

/// Default serial device
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Controller identity advertised on the bus when none is configured
pub const DEFAULT_OWN_ID: [u8; 2] = [0x77, 0x77];

/// Controller sign byte advertised on the bus when none is configured
pub const DEFAULT_OWN_SIGN: u8 = 0x77;

/// Capability a fake slave declares in its linkready (80.00 A, in 0.01 A units)
pub const SLAVE_ADVERTISED_MAX_CA: u16 = 0x1F40;

/// Linkready messages sent at startup (5 of type 1, then 5 of type 2)
pub const STARTUP_LINKREADY_COUNT: u8 = 10;

/// Maximum number of slaves tracked; the oldest is evicted beyond this
pub const MAX_SLAVES: usize = 3;

/// Minimum spacing between scheduled heartbeats
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// A slave silent for longer than this is dropped
pub const SLAVE_TIMEOUT: Duration = Duration::from_secs(26);

/// Settle time after each transmission, giving the peer time to reply
pub const POST_TX_SETTLE: Duration = Duration::from_micros(100);

/// Backoff while the remainder of a partially received frame is awaited
pub const MID_FRAME_BACKOFF: Duration = Duration::from_micros(10);

/// Beacon interval when impersonating a slave
pub const SLAVE_BEACON_INTERVAL: Duration = Duration::from_secs(10);

/// Minimum interval between power-source polls
pub const POWER_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Deadline for the external solar-meter command
pub const SOLAR_CMD_TIMEOUT: Duration = Duration::from_secs(4);

/// Local hour (inclusive) from which the solar meter is consulted
pub const SOLAR_WINDOW_START_HOUR: u32 = 6;

/// Local hour (exclusive) until which the solar meter is consulted
pub const SOLAR_WINDOW_END_HOUR: u32 = 20;

/// Mains voltage assumed when converting solar watts to amps
pub const MAINS_VOLTS: f64 = 240.0;

/// Optional override file consulted before the solar meter (contents in cA)
pub const OVERRIDE_FILE: &str = "overrideMaxAmps.txt";

/// Below this fair share (5.00 A) a slave is told to stop charging
pub const MIN_CHARGE_CA: i32 = 500;

/// Cap spike (21.00 A) that works around a droop bug in slave firmware
pub const SPIKE_CA: i32 = 2100;

/// Hold window applied to both switching a car on and switching it off
pub const ANTI_FLAP_HOLD: Duration = Duration::from_secs(60);

/// Minimum interval between successive cap reductions to one slave
pub const REDUCTION_HOLD: Duration = Duration::from_secs(10);

/// Change in actual draw (0.80 A) treated as a significant sample
pub const ACTUAL_JITTER_CA: i32 = 80;

/// Draw below this (4.00 A) means the car has not woken up yet
pub const LOW_DRAW_CA: i32 = 400;

/// Gap between cap and draw (1.00 A) suggesting the car drooped
pub const DROOP_GAP_CA: i32 = 100;

/// Cap the engine starts with; below MIN_CHARGE_CA so slaves idle until the
/// power source reports
pub const INITIAL_GLOBAL_CAP_CA: i32 = 1;

/// Default wiring limit in whole amps
pub const DEFAULT_WIRING_AMPS: i32 = 40;
