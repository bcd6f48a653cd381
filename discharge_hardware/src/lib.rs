//! Instrument backends for the discharge workspace.
//!
//! - `sim`: simulated SourceMeter driving an idealised battery
//! - `scpi`: Keithley 2400-class driver over any byte transport
//! - `transport`: TCP (always) and RS-232 (`hardware` feature) connectors
pub mod error;
pub mod scpi;
pub mod sim;
pub mod transport;

pub use error::HwError;
pub use scpi::ScpiSourceMeter;
pub use sim::{SimCell, SimulatedSourceMeter};
