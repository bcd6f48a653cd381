//! Human-readable error descriptions and structured JSON error formatting.

use discharge_core::error::{BuildError, DischargeError, StopReason, stop_reason_for};
use discharge_hardware::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: The discharge session could not be assembled ({be}).\nLikely causes: The instrument failed to open or test parameters were not derived from the config.\nHow to fix: Re-run with --log-level=debug and check the steps before the discharge started."
        );
    }

    if let Some(de) = err.downcast_ref::<DischargeError>() {
        return match de {
            DischargeError::Validation(msg) => format!(
                "What happened: Invalid test parameters ({msg}).\nLikely causes: Currents, cutoff or interval out of range for the measured cell, or no battery connected.\nHow to fix: Edit the [discharge] table of the config, check the cell connection, then rerun."
            ),
            DischargeError::Cancelled => {
                "What happened: Cancelled before the discharge started.\nLikely causes: Ctrl-C during instrument setup.\nHow to fix: Start a new run.".to_string()
            }
            DischargeError::Timeout => {
                "What happened: Instrument read timed out.\nLikely causes: Wrong address or baud rate, instrument busy, or instrument.timeout_ms too low.\nHow to fix: Verify the connection settings and consider increasing instrument.timeout_ms. The output was switched off.".to_string()
            }
            DischargeError::InstrumentFault(msg) => format!(
                "What happened: Instrument fault ({msg}).\nLikely causes: Cable disconnected, compliance reached, or an instrument error queue entry.\nHow to fix: Check the instrument front panel and wiring, then start a new run. The output was switched off."
            ),
            DischargeError::Model(msg) => format!(
                "What happened: Could not build a battery model ({msg}).\nLikely causes: The raw data contains no samples.\nHow to fix: Check the raw-data file or rerun the discharge."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return format!(
            "What happened: Could not reach the instrument ({hw}).\nLikely causes: Wrong [instrument] address or port, instrument powered off, or a network problem.\nHow to fix: Check instrument.backend and instrument.address in the config."
        );
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: Config file could not be read.\nLikely causes: Wrong --config path.\nHow to fix: Pass --config FILE or create etc/discharge.toml. ({msg})"
        );
    }

    if lower.starts_with("parse config") || lower.contains("must be") || lower.contains("required")
    {
        return format!(
            "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing [discharge] keys or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per stop reason.
pub fn exit_code_for_stop(stop: StopReason) -> i32 {
    match stop {
        StopReason::CutoffReached => 0,
        StopReason::UserCancelled => 2,
        StopReason::InstrumentFault => 3,
        StopReason::ValidationError => 4,
    }
}

/// Exit code for a failed command; errors without a stop reason return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(stop) = stop_reason_for(err) {
        return exit_code_for_stop(stop);
    }
    if err.downcast_ref::<HwError>().is_some() {
        return exit_code_for_stop(StopReason::InstrumentFault);
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = stop_reason_for(err).map_or("Error", StopReason::as_str);
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn typed_errors_survive_context() {
        let err: eyre::Result<()> = Err(eyre::Report::new(DischargeError::Timeout));
        let err = err.wrap_err("read loaded voltage").unwrap_err();
        assert_eq!(exit_code_for_error(&err), 3);
        assert!(humanize(&err).contains("timed out"));
    }

    #[test]
    fn validation_maps_to_four() {
        let err = eyre::Report::new(DischargeError::Validation("cutoff too high".into()));
        assert_eq!(exit_code_for_error(&err), 4);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "ValidationError");
        assert_eq!(v["exit_code"], 4);
    }

    #[test]
    fn untyped_errors_are_generic() {
        let err = eyre::eyre!("disk on fire");
        assert_eq!(exit_code_for_error(&err), 1);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Error");
    }
}
