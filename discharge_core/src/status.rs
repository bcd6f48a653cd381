//! Discharge session state machine.

/// `Init -> Active -> CutoffReached | Cancelled -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built, instrument untouched.
    Init,
    /// Output on; sampling loop running.
    Active,
    CutoffReached,
    Cancelled,
    /// Safe state restored; series frozen.
    Stopped,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped)
    }
}
