//! Transports for the SCPI driver.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::info;

use crate::error::{HwError, Result};
use crate::scpi::ScpiSourceMeter;

/// Connect to a raw-socket SCPI endpoint (e.g. `192.168.1.20:5025`).
pub fn connect_tcp(addr: &str, timeout: Duration) -> Result<ScpiSourceMeter<TcpStream>> {
    let sock = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| HwError::Instrument(format!("address {addr:?} did not resolve")))?;
    let stream = TcpStream::connect_timeout(&sock, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)?;
    info!(%sock, "connected to instrument");
    Ok(ScpiSourceMeter::new(stream))
}

/// Open an RS-232 port (8N1, no flow control).
#[cfg(feature = "hardware")]
pub fn open_serial(
    port: &str,
    baud: u32,
    timeout: Duration,
) -> Result<ScpiSourceMeter<Box<dyn serialport::SerialPort>>> {
    let link = serialport::new(port, baud)
        .timeout(timeout)
        .open()
        .map_err(|e| HwError::Serial(format!("open {port}: {e}")))?;
    info!(port, baud, "opened serial instrument port");
    Ok(ScpiSourceMeter::new(link))
}
