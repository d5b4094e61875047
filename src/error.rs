use thiserror::Error;

pub type Result<T> = std::result::Result<T, TwcError>;

/// Failures that can surface to a caller. Malformed frames never do: the
/// decoder logs and drops them, and the bus re-synchronizes on its own.
#[derive(Error, Debug)]
pub enum TwcError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}
