//! Session orchestration: run the controller, then extract the model.

use discharge_traits::SourceMeter;
use tracing::info;

use crate::controller::{DischargeOutcome, Discharger};
use crate::error::{Result, StopReason};
use crate::model::{BatteryModel, extract_model};

/// Everything a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: DischargeOutcome,
    /// Present only when the session reached cutoff with at least one sample.
    pub model: Option<BatteryModel>,
}

impl SessionReport {
    pub fn stop(&self) -> StopReason {
        self.outcome.stop
    }
}

/// Run a discharge and, on cutoff, extract the battery model.
///
/// A cancelled session keeps its partial series but yields no model.
pub fn run_session<I: SourceMeter>(discharger: &mut Discharger<I>) -> Result<SessionReport> {
    let outcome = discharger.run()?;
    let model = match outcome.stop {
        StopReason::CutoffReached if !outcome.series.is_empty() => {
            Some(extract_model(&outcome.series)?)
        }
        _ => None,
    };
    if let Some(m) = &model {
        info!(
            capacity_ah = m.capacity_ah,
            degraded = m.is_degraded(),
            "model extracted"
        );
    }
    Ok(SessionReport { outcome, model })
}
