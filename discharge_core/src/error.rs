use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DischargeError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("cancelled by user")]
    Cancelled,
    #[error("instrument fault: {0}")]
    InstrumentFault(String),
    #[error("instrument timeout")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("model extraction failed: {0}")]
    Model(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing instrument")]
    MissingInstrument,
    #[error("missing test parameters")]
    MissingParameters,
    #[error("missing discharge profile")]
    MissingProfile,
    #[error("missing cutoff voltage")]
    MissingCutoff,
    #[error("missing measure interval")]
    MissingInterval,
    #[error("missing initial open-circuit voltage")]
    MissingInitialVoc,
}

/// Why a discharge session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CutoffReached,
    UserCancelled,
    ValidationError,
    InstrumentFault,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::CutoffReached => "CutoffReached",
            StopReason::UserCancelled => "UserCancelled",
            StopReason::ValidationError => "ValidationError",
            StopReason::InstrumentFault => "InstrumentFault",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DischargeError {
    /// Stop reason a session ending with this error reports, if any.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            DischargeError::Validation(_) => Some(StopReason::ValidationError),
            DischargeError::Cancelled => Some(StopReason::UserCancelled),
            DischargeError::InstrumentFault(_) | DischargeError::Timeout => {
                Some(StopReason::InstrumentFault)
            }
            DischargeError::State(_) | DischargeError::Model(_) | DischargeError::Io(_) => None,
        }
    }
}

/// Classify an error report into a stop reason by downcasting known error types.
pub fn stop_reason_for(err: &Report) -> Option<StopReason> {
    if let Some(de) = err.downcast_ref::<DischargeError>() {
        return de.stop_reason();
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return Some(StopReason::ValidationError);
    }
    None
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
