#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core battery discharge logic (hardware-agnostic).
//!
//! All instrument interaction goes through `discharge_traits::SourceMeter`;
//! all waiting goes through `discharge_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Parameters**: validated, immutable `TestParameters` (`params` module)
//! - **ESR sampler**: one load-step measurement (`esr` module)
//! - **Controller**: `Discharger` state machine for constant and list profiles
//! - **Safety**: `InstrumentGuard` forces current 0 / output off on every exit path
//! - **Raw store**: append-only `RawSampleSeries` (`samples` module)
//! - **Model**: 101-point SOC resampling (`model` module) and CSV writers (`persist`)

pub mod builder;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod esr;
pub mod guard;
pub mod hw_error;
pub mod mocks;
pub mod model;
pub mod params;
pub mod persist;
pub mod preflight;
pub mod runner;
pub mod samples;
pub mod status;
pub mod util;

pub use builder::{DischargerBuilder, DynDischarger};
pub use controller::{DischargeOutcome, Discharger};
pub use error::{BuildError, DischargeError, Report, Result, StopReason, stop_reason_for};
pub use esr::{EsrReading, measure_esr};
pub use guard::InstrumentGuard;
pub use model::{BatteryModel, MODEL_POINTS, ModelAdvisory, ModelPoint, extract_model};
pub use params::{Profile, SamplingCfg, Step, TestParameters, select_primary};
pub use preflight::{InstrumentSetup, configure, probe_open_circuit};
pub use runner::{SessionReport, run_session};
pub use samples::{RawSample, RawSampleSeries};
pub use status::SessionState;
