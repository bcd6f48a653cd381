use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("instrument timeout")]
    Timeout,
    #[error("instrument reported error: {0}")]
    Instrument(String),
    #[error("unparseable instrument response {response:?} to {command}")]
    Parse { command: String, response: String },
    #[error("instrument connection closed")]
    Disconnected,
    #[error("output is disabled")]
    OutputOff,
    #[error("serial: {0}")]
    Serial(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
