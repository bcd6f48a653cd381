use discharge_core::error::BuildError;
use discharge_core::mocks::ScriptedMeter;
use discharge_core::{DynDischarger, Profile, SessionState, TestParameters};
use rstest::rstest;

fn params() -> TestParameters {
    TestParameters::builder()
        .profile(Profile::constant(0.2))
        .cutoff_v(3.0)
        .measure_interval_s(5.0)
        .initial_voc(4.0)
        .build()
        .expect("valid parameters")
}

#[rstest]
fn builder_missing_instrument_yields_typed_build_error() {
    let err = DynDischarger::builder()
        // missing with_instrument()
        .with_params(params())
        .try_build()
        .expect_err("should fail with MissingInstrument");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingInstrument) => {}
        other => panic!("expected MissingInstrument, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_params_yields_typed_build_error() {
    let err = DynDischarger::builder()
        .with_instrument(ScriptedMeter::new(|_| 4.0))
        .try_build()
        .expect_err("should fail with MissingParameters");

    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingParameters)
    ));
    assert_eq!(
        discharge_core::stop_reason_for(&err),
        Some(discharge_core::StopReason::ValidationError)
    );
}

#[rstest]
fn complete_builder_starts_in_init() {
    let d = DynDischarger::builder()
        .with_instrument(ScriptedMeter::new(|_| 4.0))
        .with_params(params())
        .build()
        .expect("build");
    assert_eq!(d.state(), SessionState::Init);
    assert_eq!(d.params().cutoff_v(), 3.0);
}
