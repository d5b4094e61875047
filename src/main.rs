//! Long-running controller binary.
//!
//! Usage:
//!   twc-controller                        # master mode on the default port
//!   twc-controller --port /dev/ttyUSB1 --wiring-amps 32
//!   twc-controller --pick-port            # choose interactively
//!   twc-controller --slave                # diagnostic fake-slave mode
//!
//! Set RUST_LOG to control logging, e.g. RUST_LOG=debug twc-controller.

use clap::Parser;
use inquire::Select;
use log::info;
use std::path::PathBuf;
use twc_controller::clock::SystemClock;
use twc_controller::config::Config;
use twc_controller::constants::{DEFAULT_OWN_ID, DEFAULT_OWN_SIGN};
use twc_controller::master::Master;
use twc_controller::power::PowerSource;
use twc_controller::slave::Slave;
use twc_controller::transport::SerialBus;
use twc_controller::types::{Sign, TwcId};
use twc_controller::{Result, TwcError};

#[derive(Parser, Debug)]
#[command(
    name = "twc-controller",
    version,
    about = "Impersonates a Tesla Wall Connector master to cap slave charging current"
)]
struct Cli {
    /// Serial device of the RS-485 adapter (overrides the config file)
    #[arg(long)]
    port: Option<String>,

    /// Pick the serial device interactively from the ports on this machine
    #[arg(long, conflicts_with = "port")]
    pick_port: bool,

    /// Hard wiring limit shared by all connectors, in whole amps
    #[arg(long)]
    wiring_amps: Option<i32>,

    /// Shell command queried for solar generation
    #[arg(long)]
    solar_command: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Impersonate a slave instead of a master (diagnostic)
    #[arg(long)]
    slave: bool,
}

/// Let the operator choose among the serial devices on this machine.
fn pick_port() -> Result<String> {
    let ports = SerialBus::list_ports()?;
    if ports.is_empty() {
        return Err(TwcError::Config(
            "no serial ports found on this machine".into(),
        ));
    }
    let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
    Select::new("RS-485 adapter:", names)
        .prompt()
        .map_err(|e| TwcError::Config(format!("port selection aborted: {}", e)))
}

fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    } else if cli.pick_port {
        config.port = pick_port()?;
    }
    if let Some(wiring) = cli.wiring_amps {
        config.wiring_max_amps = wiring;
    }
    if let Some(cmd) = cli.solar_command {
        config.solar_command = Some(cmd);
    }

    info!("Opening {} at 9600 8N1", config.port);
    let bus = SerialBus::open(&config.port)?;
    let clock = SystemClock::new();
    let own_id = TwcId(DEFAULT_OWN_ID);
    let own_sign = Sign(DEFAULT_OWN_SIGN);

    if cli.slave {
        Slave::new(bus, clock, own_id, own_sign).run()
    } else {
        let power = PowerSource::new(&config.override_file, config.solar_command.clone());
        Master::new(bus, clock, power, own_id, own_sign, config.wiring_max_amps).run()
    }
}
