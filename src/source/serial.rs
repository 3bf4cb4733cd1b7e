//! Serial link to the counting microcontroller.

use crate::error::AppError;
use std::io::BufReader;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Short read timeout so the reader notices the stop flag; timeouts are not errors.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub type SerialReader = BufReader<Box<dyn serialport::SerialPort>>;

pub fn open_serial(port: &str, baud_rate: u32) -> Result<SerialReader, AppError> {
    let serial = serialport::new(port, baud_rate)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|err| AppError::TransportOpen {
            port: port.to_string(),
            reason: err.to_string(),
        })?;
    info!(port, baud_rate, "Serial transport opened");
    Ok(BufReader::new(serial))
}
