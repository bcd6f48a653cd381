//! Append-only raw sample store.
//!
//! Four parallel sequences that always grow together. The controller is the
//! only writer; once `freeze` records the session capacity the series is
//! read-only and handed to the model extractor.

use eyre::WrapErr;

use crate::error::{DischargeError, Result};

/// One row of the raw series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// Seconds since session start.
    pub t_s: f64,
    pub voc: f64,
    pub vload: f64,
    pub esr: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSampleSeries {
    t_s: Vec<f64>,
    voc: Vec<f64>,
    vload: Vec<f64>,
    esr: Vec<f64>,
    capacity_ah: Option<f64>,
}

impl RawSampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            t_s: Vec::with_capacity(n),
            voc: Vec::with_capacity(n),
            vload: Vec::with_capacity(n),
            esr: Vec::with_capacity(n),
            capacity_ah: None,
        }
    }

    /// Build a series from samples in acquisition order.
    ///
    /// Fails on the first sample `push` would reject; nothing is dropped.
    pub fn try_from_samples<I>(samples: I) -> Result<Self>
    where
        I: IntoIterator<Item = RawSample>,
    {
        let mut series = RawSampleSeries::new();
        for (i, s) in samples.into_iter().enumerate() {
            series
                .push(s)
                .wrap_err_with(|| format!("sample {i}"))?;
        }
        Ok(series)
    }

    /// Append one sample; all four sequences grow or none do.
    pub fn push(&mut self, s: RawSample) -> Result<()> {
        if self.capacity_ah.is_some() {
            return Err(eyre::Report::new(DischargeError::State(
                "append to a frozen sample series".into(),
            )));
        }
        if !s.t_s.is_finite() {
            return Err(eyre::Report::new(DischargeError::State(format!(
                "non-finite timestamp {}",
                s.t_s
            ))));
        }
        if let Some(last) = self.last_timestamp()
            && s.t_s < last
        {
            return Err(eyre::Report::new(DischargeError::State(format!(
                "timestamp {} precedes previous sample at {last}",
                s.t_s
            ))));
        }
        self.t_s.push(s.t_s);
        self.voc.push(s.voc);
        self.vload.push(s.vload);
        self.esr.push(s.esr);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.t_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t_s.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.t_s.last().copied()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.t_s
    }

    pub fn voc(&self) -> &[f64] {
        &self.voc
    }

    pub fn vload(&self) -> &[f64] {
        &self.vload
    }

    pub fn esr(&self) -> &[f64] {
        &self.esr
    }

    pub fn get(&self, i: usize) -> Option<RawSample> {
        Some(RawSample {
            t_s: *self.t_s.get(i)?,
            voc: self.voc[i],
            vload: self.vload[i],
            esr: self.esr[i],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = RawSample> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    /// Record the session capacity and stop accepting samples.
    pub fn freeze(&mut self, capacity_ah: f64) {
        self.capacity_ah = Some(capacity_ah);
    }

    pub fn is_frozen(&self) -> bool {
        self.capacity_ah.is_some()
    }

    /// Session capacity in Ah; zero until frozen.
    pub fn capacity_ah(&self) -> f64 {
        self.capacity_ah.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(t_s: f64) -> RawSample {
        RawSample {
            t_s,
            voc: 4.0,
            vload: 3.9,
            esr: 0.1,
        }
    }

    #[test]
    fn sequences_grow_together() {
        let mut r = RawSampleSeries::new();
        r.push(s(1.0)).unwrap();
        r.push(s(1.0)).unwrap();
        r.push(s(2.5)).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.voc().len(), 3);
        assert_eq!(r.vload().len(), 3);
        assert_eq!(r.esr().len(), 3);
        assert_eq!(r.last_timestamp(), Some(2.5));
        assert_eq!(r.get(2), Some(s(2.5)));
        assert_eq!(r.get(3), None);
    }

    #[test]
    fn rejects_time_going_backwards() {
        let mut r = RawSampleSeries::new();
        r.push(s(5.0)).unwrap();
        let err = r.push(s(4.0)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DischargeError>(),
            Some(DischargeError::State(_))
        ));
        assert!(r.push(s(f64::NAN)).is_err());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn building_from_unordered_samples_fails() {
        let err = RawSampleSeries::try_from_samples([0.0, 10.0, 5.0, f64::NAN, 20.0].map(s))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DischargeError>(),
            Some(DischargeError::State(_))
        ));
        assert!(err.to_string().contains("sample 2"));
        assert!(RawSampleSeries::try_from_samples([0.0, f64::NAN].map(s)).is_err());

        let ok = RawSampleSeries::try_from_samples([0.0, 10.0, 10.0, 20.0].map(s)).unwrap();
        assert_eq!(ok.timestamps(), &[0.0, 10.0, 10.0, 20.0]);
    }

    #[test]
    fn frozen_series_is_read_only() {
        let mut r = RawSampleSeries::new();
        r.push(s(0.0)).unwrap();
        assert_eq!(r.capacity_ah(), 0.0);
        r.freeze(0.25);
        assert!(r.is_frozen());
        assert_eq!(r.capacity_ah(), 0.25);
        assert!(r.push(s(1.0)).is_err());
        assert_eq!(r.len(), 1);
    }
}
