//! 101-point battery model extraction.
//!
//! The raw series is resampled onto SOC 100..=0 at evenly spaced elapsed
//! times. SOC 100 is the first raw sample, SOC 0 the last, and every point in
//! between takes the raw sample nearest in time to its target. The search
//! cursor only moves forward, so extraction is a single pass.

use tracing::warn;

use crate::error::{DischargeError, Result};
use crate::samples::RawSampleSeries;
use crate::util::round_capacity;

pub const MODEL_POINTS: usize = 101;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelAdvisory {
    /// Fewer raw samples than model points; neighbouring SOC entries repeat.
    SparseSamples { samples: usize },
}

impl std::fmt::Display for ModelAdvisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelAdvisory::SparseSamples { samples } => write!(
                f,
                "only {samples} raw samples for {MODEL_POINTS} model points; entries repeat"
            ),
        }
    }
}

/// One row of a model, by SOC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPoint {
    pub soc: u8,
    /// Seconds since the first raw sample.
    pub t_s: f64,
    pub voc: f64,
    pub vload: f64,
    pub esr: f64,
}

/// Arrays are indexed by SOC: index 100 is the full battery.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryModel {
    pub soc: [u8; MODEL_POINTS],
    pub voc: [f64; MODEL_POINTS],
    pub vload: [f64; MODEL_POINTS],
    pub esr: [f64; MODEL_POINTS],
    pub tstamp: [f64; MODEL_POINTS],
    /// Rounded to 0.1 mAh.
    pub capacity_ah: f64,
    pub advisory: Option<ModelAdvisory>,
}

impl BatteryModel {
    pub fn point(&self, soc: usize) -> Option<ModelPoint> {
        (soc < MODEL_POINTS).then(|| ModelPoint {
            soc: self.soc[soc],
            t_s: self.tstamp[soc],
            voc: self.voc[soc],
            vload: self.vload[soc],
            esr: self.esr[soc],
        })
    }

    /// Points from SOC 0 up to SOC 100.
    pub fn points(&self) -> impl Iterator<Item = ModelPoint> + '_ {
        (0..MODEL_POINTS).filter_map(|i| self.point(i))
    }

    pub fn is_degraded(&self) -> bool {
        self.advisory.is_some()
    }
}

/// Resample a raw series onto the 101-point SOC grid.
pub fn extract_model(raw: &RawSampleSeries) -> Result<BatteryModel> {
    let n = raw.len();
    if n == 0 {
        return Err(eyre::Report::new(DischargeError::Model(
            "raw sample series is empty".into(),
        )));
    }
    let ts = raw.timestamps();
    let t0 = ts[0];
    let total = ts[n - 1] - t0;
    let elapsed = |i: usize| ts[i] - t0;

    let mut m = BatteryModel {
        soc: [0; MODEL_POINTS],
        voc: [0.0; MODEL_POINTS],
        vload: [0.0; MODEL_POINTS],
        esr: [0.0; MODEL_POINTS],
        tstamp: [0.0; MODEL_POINTS],
        capacity_ah: round_capacity(raw.capacity_ah()),
        advisory: None,
    };
    let mut fill = |soc: usize, i: usize| {
        m.soc[soc] = soc as u8;
        m.voc[soc] = raw.voc()[i];
        m.vload[soc] = raw.vload()[i];
        m.esr[soc] = raw.esr()[i];
        m.tstamp[soc] = elapsed(i);
    };

    fill(100, 0);
    let mut cursor = 0;
    for soc in (1..MODEL_POINTS - 1).rev() {
        let target = (100 - soc) as f64 * total / 100.0;
        let mut i = cursor;
        while i < n - 1 && elapsed(i) < target {
            i += 1;
        }
        if i > cursor && elapsed(i) != target {
            let over = elapsed(i) - target;
            let under = target - elapsed(i - 1);
            // Equidistant neighbours resolve to the earlier sample.
            if under <= over {
                i -= 1;
            }
        }
        cursor = i;
        fill(soc, i);
    }
    fill(0, n - 1);

    if n < MODEL_POINTS {
        let advisory = ModelAdvisory::SparseSamples { samples: n };
        warn!(%advisory, "degraded battery model");
        m.advisory = Some(advisory);
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::RawSample;

    fn series(ts: &[f64]) -> RawSampleSeries {
        RawSampleSeries::try_from_samples(ts.iter().enumerate().map(|(k, &t_s)| RawSample {
            t_s,
            voc: 4.2 - 0.01 * k as f64,
            vload: 4.1 - 0.01 * k as f64,
            esr: 0.1,
        }))
        .unwrap()
    }

    #[test]
    fn empty_series_is_rejected() {
        let err = extract_model(&RawSampleSeries::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DischargeError>(),
            Some(DischargeError::Model(_))
        ));
    }

    #[test]
    fn single_sample_fills_every_point() {
        let m = extract_model(&series(&[12.0])).unwrap();
        assert!(m.tstamp.iter().all(|&t| t == 0.0));
        assert!(m.voc.iter().all(|&v| v == 4.2));
        assert!(m.is_degraded());
    }

    #[test]
    fn equidistant_neighbours_pick_earlier_sample() {
        // total 100 s; SOC 99 targets 1.0 s, halfway between 0.5 and 1.5
        let m = extract_model(&series(&[0.0, 0.5, 1.5, 100.0])).unwrap();
        assert_eq!(m.tstamp[99], 0.5);
    }

    #[test]
    fn nearest_neighbour_wins() {
        let m = extract_model(&series(&[0.0, 0.8, 1.9, 100.0])).unwrap();
        assert_eq!(m.tstamp[99], 0.8);
        // SOC 98 targets 2.0 s: 1.9 is closer than 100
        assert_eq!(m.tstamp[98], 1.9);
    }

    #[test]
    fn first_timestamp_need_not_be_zero() {
        let m = extract_model(&series(&[30.0, 40.0, 130.0])).unwrap();
        assert_eq!(m.tstamp[100], 0.0);
        assert_eq!(m.tstamp[0], 100.0);
        assert_eq!(m.tstamp[90], 10.0);
    }

    #[test]
    fn capacity_is_rounded() {
        let mut r = series(&[0.0, 1.0]);
        r.freeze(0.123_456);
        let m = extract_model(&r).unwrap();
        assert_eq!(m.capacity_ah, 0.1235);
    }
}
