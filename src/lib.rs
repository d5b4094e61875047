//! # TWC Controller
//!
//! A Rust implementation of a Tesla Wall Connector (TWC) master for RS-485.
//! By impersonating the master side of the proprietary load-sharing protocol
//! it regulates, in 0.01 A steps, how much current real slave connectors let
//! their cars draw - typically to track available solar generation.
//!
//! ## Features
//!
//! - SLIP-style frame codec with tolerant end-of-frame recovery
//! - Master link-establishment bursts and ~1 Hz round-robin heartbeats
//! - Per-slave current allocation with anti-flap holds and a firmware-bug
//!   workaround
//! - Slave liveness supervision (26 s expiry, bounded registry)
//! - Pluggable power source: operator override file or a solar-meter command
//! - Diagnostic fake-slave mode for exercising a master without hardware
//!
//! ## Example
//!
//! ```no_run
//! use twc_controller::clock::SystemClock;
//! use twc_controller::constants::{DEFAULT_OWN_ID, DEFAULT_OWN_SIGN};
//! use twc_controller::master::Master;
//! use twc_controller::power::PowerSource;
//! use twc_controller::transport::SerialBus;
//! use twc_controller::types::{Sign, TwcId};
//!
//! fn main() -> twc_controller::Result<()> {
//!     let bus = SerialBus::open("/dev/ttyUSB0")?;
//!     let power = PowerSource::file_only();
//!     let mut master = Master::new(
//!         bus,
//!         SystemClock::new(),
//!         power,
//!         TwcId(DEFAULT_OWN_ID),
//!         Sign(DEFAULT_OWN_SIGN),
//!         40,
//!     );
//!     master.run()
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod master;
pub mod message;
pub mod policy;
pub mod power;
pub mod registry;
pub mod slave;
pub mod transport;
pub mod types;

pub use error::{Result, TwcError};
pub use master::Master;
pub use registry::{SlaveRecord, SlaveRegistry};
pub use slave::Slave;
pub use types::{HeartbeatCommand, Message, Sign, SlaveStatus, TwcId};
