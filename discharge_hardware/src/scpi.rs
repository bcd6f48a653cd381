//! SCPI driver for Keithley 2400-class SourceMeters.
//!
//! The driver is generic over any byte transport (`Read + Write`): a TCP
//! socket to a LAN/GPIB gateway, an RS-232 port, or an in-memory fake in tests.
//! Commands are newline terminated; every query reads exactly one response line.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};

use discharge_traits::{HwResult, SourceMeter, Terminals, Wiring};
use tracing::{debug, trace};

use crate::error::{HwError, Result};

pub struct ScpiSourceMeter<T: Read + Write> {
    link: BufReader<T>,
}

impl<T: Read + Write> ScpiSourceMeter<T> {
    pub fn new(transport: T) -> Self {
        Self {
            link: BufReader::new(transport),
        }
    }

    /// Give back the underlying transport.
    pub fn into_inner(self) -> T {
        self.link.into_inner()
    }

    /// Send a command that produces no response.
    pub fn command(&mut self, cmd: &str) -> Result<()> {
        debug!(cmd, "scpi write");
        let io = self.link.get_mut();
        io.write_all(cmd.as_bytes()).map_err(map_io)?;
        io.write_all(b"\n").map_err(map_io)?;
        io.flush().map_err(map_io)
    }

    /// Send a query and return its trimmed response line.
    pub fn query(&mut self, cmd: &str) -> Result<String> {
        self.command(cmd)?;
        let mut line = String::new();
        let n = self.link.read_line(&mut line).map_err(map_io)?;
        if n == 0 {
            return Err(HwError::Disconnected);
        }
        let resp = line.trim().to_string();
        trace!(cmd, resp = %resp, "scpi read");
        Ok(resp)
    }

    fn query_f64(&mut self, cmd: &str) -> Result<f64> {
        let resp = self.query(cmd)?;
        // :READ? may return a comma-separated element list; the first element is voltage.
        let first = resp.split(',').next().unwrap_or_default().trim();
        first.parse::<f64>().map_err(|_| HwError::Parse {
            command: cmd.to_string(),
            response: resp.clone(),
        })
    }

    /// Pop the oldest entry of the instrument error queue; `Ok(())` when empty.
    pub fn check_errors(&mut self) -> Result<()> {
        let resp = self.query(":SYST:ERR?")?;
        let code = resp
            .split(',')
            .next()
            .and_then(|c| c.trim().parse::<i32>().ok())
            .ok_or_else(|| HwError::Parse {
                command: ":SYST:ERR?".into(),
                response: resp.clone(),
            })?;
        if code == 0 {
            Ok(())
        } else {
            Err(HwError::Instrument(resp))
        }
    }
}

fn map_io(e: std::io::Error) -> HwError {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => HwError::Timeout,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            HwError::Disconnected
        }
        _ => HwError::Io(e),
    }
}

fn on_off(b: bool) -> &'static str {
    if b { "ON" } else { "OFF" }
}

impl<T: Read + Write> SourceMeter for ScpiSourceMeter<T> {
    fn identify(&mut self) -> HwResult<String> {
        Ok(self.query("*IDN?")?)
    }

    fn reset(&mut self) -> HwResult<()> {
        self.command("*RST")?;
        self.command("*CLS")?;
        self.command(":SOUR:FUNC CURR")?;
        self.command(":SOUR:CURR:MODE FIX")?;
        self.command(":SENS:FUNC \"VOLT\"")?;
        self.command(":FORM:ELEM VOLT")?;
        // Auto-zero is triggered explicitly before each sample.
        self.command(":SYST:AZER OFF")?;
        self.check_errors()?;
        Ok(())
    }

    fn set_source_current(&mut self, amps: f64) -> HwResult<()> {
        Ok(self.command(&format!(":SOUR:CURR:LEV {amps}"))?)
    }

    fn source_current(&mut self) -> HwResult<f64> {
        Ok(self.query_f64(":SOUR:CURR:LEV?")?)
    }

    fn set_current_range(&mut self, amps: f64) -> HwResult<()> {
        Ok(self.command(&format!(":SOUR:CURR:RANG {amps}"))?)
    }

    fn current_range(&mut self) -> HwResult<f64> {
        Ok(self.query_f64(":SOUR:CURR:RANG?")?)
    }

    fn set_voltage_range(&mut self, volts: f64) -> HwResult<()> {
        Ok(self.command(&format!(":SENS:VOLT:RANG {volts}"))?)
    }

    fn voltage_range(&mut self) -> HwResult<f64> {
        Ok(self.query_f64(":SENS:VOLT:RANG?")?)
    }

    fn set_compliance_voltage(&mut self, volts: f64) -> HwResult<()> {
        Ok(self.command(&format!(":SENS:VOLT:PROT {volts}"))?)
    }

    fn compliance_voltage(&mut self) -> HwResult<f64> {
        Ok(self.query_f64(":SENS:VOLT:PROT?")?)
    }

    fn set_wiring(&mut self, wiring: Wiring) -> HwResult<()> {
        let four = matches!(wiring, Wiring::FourWire);
        Ok(self.command(&format!(":SYST:RSEN {}", on_off(four)))?)
    }

    fn set_terminals(&mut self, terminals: Terminals) -> HwResult<()> {
        let t = match terminals {
            Terminals::Front => "FRON",
            Terminals::Rear => "REAR",
        };
        Ok(self.command(&format!(":ROUT:TERM {t}"))?)
    }

    fn set_nplc(&mut self, nplc: f64) -> HwResult<()> {
        Ok(self.command(&format!(":SENS:VOLT:NPLC {nplc}"))?)
    }

    fn set_line_frequency(&mut self, hz: f64) -> HwResult<()> {
        Ok(self.command(&format!(":SYST:LFR {hz}"))?)
    }

    fn line_frequency(&mut self) -> HwResult<f64> {
        Ok(self.query_f64(":SYST:LFR?")?)
    }

    fn auto_zero_once(&mut self) -> HwResult<()> {
        Ok(self.command(":SYST:AZER ONCE")?)
    }

    fn set_output(&mut self, enabled: bool) -> HwResult<()> {
        Ok(self.command(&format!(":OUTP {}", on_off(enabled)))?)
    }

    fn measure_voltage(&mut self) -> HwResult<f64> {
        Ok(self.query_f64(":READ?")?)
    }

    fn beep(&mut self, hz: f64, secs: f64) -> HwResult<()> {
        Ok(self.command(&format!(":SYST:BEEP {hz},{secs}"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Transport that records writes and replays canned response bytes.
    struct Loopback {
        written: Vec<u8>,
        replies: Cursor<Vec<u8>>,
    }

    impl Loopback {
        fn new(replies: &str) -> Self {
            Self {
                written: Vec::new(),
                replies: Cursor::new(replies.as_bytes().to_vec()),
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn commands_are_newline_terminated() {
        let mut sm = ScpiSourceMeter::new(Loopback::new(""));
        sm.set_source_current(-0.5).unwrap();
        sm.set_output(true).unwrap();
        let sent = String::from_utf8(sm.into_inner().written).unwrap();
        assert_eq!(sent, ":SOUR:CURR:LEV -0.5\n:OUTP ON\n");
    }

    #[test]
    fn read_parses_first_element() {
        let mut sm = ScpiSourceMeter::new(Loopback::new("+3.712345E+00,+1.0E-01\n"));
        let v = sm.measure_voltage().unwrap();
        assert!((v - 3.712345).abs() < 1e-12);
    }

    #[test]
    fn garbage_response_is_parse_error() {
        let mut sm = ScpiSourceMeter::new(Loopback::new("hello\n"));
        let err = sm.source_current().unwrap_err();
        let hw = err.downcast_ref::<HwError>().expect("typed error");
        assert!(matches!(hw, HwError::Parse { .. }));
    }

    #[test]
    fn eof_is_disconnected() {
        let mut sm = ScpiSourceMeter::new(Loopback::new(""));
        let err = sm.identify().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HwError>(),
            Some(HwError::Disconnected)
        ));
    }

    #[test]
    fn error_queue_entry_surfaces() {
        let mut sm = ScpiSourceMeter::new(Loopback::new("-113,\"Undefined header\"\n"));
        match sm.check_errors() {
            Err(HwError::Instrument(msg)) => assert!(msg.contains("Undefined header")),
            other => panic!("expected instrument error, got {other:?}"),
        }
    }
}
