//! Model and raw-data files.
//!
//! Both files are CSV written through `csv::Writer` and land atomically
//! (temp file in the target directory, fsync, rename).
//!
//! Model file layout:
//! ```text
//! Keithley 2281S Battery Model
//! Capacity(AH),0.1
//! SOC,Voc,ESR
//! 0,3.0012,0.15
//! ...
//! 100,4.1987,0.1500012
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use crate::controller::DischargeOutcome;
use crate::error::{DischargeError, Result};
use crate::model::BatteryModel;
use crate::params::{Profile, TestParameters};
use crate::samples::{RawSample, RawSampleSeries};

pub const MODEL_HEADER: &str = "Keithley 2281S Battery Model";
pub const RAW_COLUMNS: [&str; 4] = ["t_s", "voc_v", "vload_v", "esr_ohm"];
pub const MODEL_COLUMNS: [&str; 5] = ["soc", "t_s", "voc_v", "vload_v", "esr_ohm"];

#[derive(Debug, Serialize, Deserialize)]
struct RawRow {
    t_s: f64,
    voc_v: f64,
    vload_v: f64,
    esr_ohm: f64,
}

#[derive(Debug, Serialize)]
struct ModelRow {
    soc: u8,
    t_s: f64,
    voc_v: f64,
    vload_v: f64,
    esr_ohm: f64,
}

/// Format with `sig` significant digits, trailing zeros removed (like C `%g`).
pub fn fmt_sig(x: f64, sig: usize) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if x == 0.0 {
        return "0".into();
    }
    let sig = sig.max(1);
    let sci = format!("{:.*e}", sig - 1, x);
    let (mant, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= sig as i32 {
        format!("{}e{exp:+03}", strip_zeros(mant))
    } else {
        let decimals = (sig as i32 - 1 - exp).max(0) as usize;
        strip_zeros(&format!("{x:.decimals$}")).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn io_err(e: impl std::fmt::Display) -> eyre::Report {
    eyre::Report::new(DischargeError::Io(e.to_string()))
}

fn flexible_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_writer(Vec::new())
}

fn finish(w: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    w.into_inner().map_err(|e| io_err(e.error()))
}

/// Render the simulator model file.
pub fn render_model_csv(model: &BatteryModel) -> Result<Vec<u8>> {
    let mut w = flexible_writer();
    w.write_record([MODEL_HEADER]).map_err(io_err)?;
    w.write_record(["Capacity(AH)", model.capacity_ah.to_string().as_str()])
        .map_err(io_err)?;
    w.write_record(["SOC", "Voc", "ESR"]).map_err(io_err)?;
    for p in model.points() {
        w.write_record([
            p.soc.to_string(),
            format!("{:.4}", p.voc),
            fmt_sig(p.esr, 7),
        ])
        .map_err(io_err)?;
    }
    finish(w)
}

fn setup_rows(params: &TestParameters) -> Vec<(String, String)> {
    let mut rows = vec![("profile".to_string(), params.profile().name().to_string())];
    match params.profile() {
        Profile::Constant { current_a } => rows.push(("current_a".into(), current_a.to_string())),
        Profile::List { steps, primary } => {
            for (i, s) in steps.iter().enumerate() {
                rows.push((format!("step{i}_current_a"), s.current_a.to_string()));
                rows.push((format!("step{i}_duration_s"), s.duration_s.to_string()));
            }
            rows.push(("primary_step".into(), primary.to_string()));
        }
    }
    let s = params.sampling();
    rows.extend([
        ("max_current_a".into(), params.max_discharge_current_a().to_string()),
        (
            "average_current_a".into(),
            params.profile().average_current_a().to_string(),
        ),
        ("cutoff_v".into(), params.cutoff_v().to_string()),
        ("measure_interval_s".into(), params.measure_interval_s().to_string()),
        ("terminals".into(), format!("{:?}", params.terminals())),
        ("wiring".into(), format!("{:?}", params.wiring())),
        ("initial_voc_v".into(), params.initial_voc().to_string()),
        ("voltage_range_v".into(), params.voltage_range_v().to_string()),
        ("compliance_v".into(), params.compliance_v().to_string()),
        ("settle_s".into(), s.settle_s.to_string()),
        ("nplc".into(), s.nplc.to_string()),
        ("line_frequency_hz".into(), s.line_frequency_hz.to_string()),
    ]);
    rows
}

/// Render the setup, raw-data and model sections into one CSV document.
pub fn render_raw_dump(
    params: &TestParameters,
    outcome: &DischargeOutcome,
    model: Option<&BatteryModel>,
) -> Result<Vec<u8>> {
    let mut w = flexible_writer();
    w.write_record(["Setup"]).map_err(io_err)?;
    for (k, v) in setup_rows(params) {
        w.write_record([k, v]).map_err(io_err)?;
    }
    w.write_record(["stop_reason", outcome.stop.as_str()])
        .map_err(io_err)?;
    w.write_record(["capacity_ah", outcome.capacity_ah().to_string().as_str()])
        .map_err(io_err)?;
    w.write_record(["samples", outcome.series.len().to_string().as_str()])
        .map_err(io_err)?;

    w.write_record(["Raw data"]).map_err(io_err)?;
    w.write_record(RAW_COLUMNS).map_err(io_err)?;
    for s in outcome.series.iter() {
        w.serialize(RawRow {
            t_s: s.t_s,
            voc_v: s.voc,
            vload_v: s.vload,
            esr_ohm: s.esr,
        })
        .map_err(io_err)?;
    }

    if let Some(model) = model {
        w.write_record(["Model"]).map_err(io_err)?;
        w.write_record(MODEL_COLUMNS).map_err(io_err)?;
        for p in model.points().collect::<Vec<_>>().into_iter().rev() {
            w.serialize(ModelRow {
                soc: p.soc,
                t_s: p.t_s,
                voc_v: p.voc,
                vload_v: p.vload,
                esr_ohm: p.esr,
            })
            .map_err(io_err)?;
        }
    }
    finish(w)
}

/// Read the raw-data section of a dump, or a bare `t_s,voc_v,vload_v,esr_ohm` CSV.
///
/// Rows are taken from the column header up to the first row that is not four
/// numbers. The returned series is not frozen.
pub fn read_raw_csv(path: &Path) -> Result<RawSampleSeries> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(io_err)
        .wrap_err_with(|| format!("open raw data {}", path.display()))?;

    let mut series = RawSampleSeries::new();
    let mut in_data = false;
    for rec in rdr.records() {
        let rec = rec
            .map_err(io_err)
            .wrap_err_with(|| format!("read raw data {}", path.display()))?;
        if !in_data {
            in_data = rec.iter().eq(RAW_COLUMNS);
            continue;
        }
        if rec.len() != RAW_COLUMNS.len() {
            break;
        }
        let Ok(row) = rec.deserialize::<RawRow>(None) else {
            break;
        };
        series
            .push(RawSample {
                t_s: row.t_s,
                voc: row.voc_v,
                vload: row.vload_v,
                esr: row.esr_ohm,
            })
            .wrap_err_with(|| format!("raw data {}", path.display()))?;
    }
    if !in_data {
        return Err(eyre::Report::new(DischargeError::Io(format!(
            "{}: no '{}' header found",
            path.display(),
            RAW_COLUMNS.join(",")
        ))));
    }
    Ok(series)
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `bytes` to `path` via a temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    let write = || -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_err(e)
    })
    .wrap_err_with(|| format!("write {}", path.display()))
}

pub fn write_model_file(path: &Path, model: &BatteryModel) -> Result<()> {
    write_atomic(path, &render_model_csv(model)?)?;
    tracing::info!(path = %path.display(), capacity_ah = model.capacity_ah, "model written");
    Ok(())
}

pub fn write_raw_dump(
    path: &Path,
    params: &TestParameters,
    outcome: &DischargeOutcome,
    model: Option<&BatteryModel>,
) -> Result<()> {
    write_atomic(path, &render_raw_dump(params, outcome, model)?)?;
    tracing::info!(path = %path.display(), samples = outcome.series.len(), "raw data written");
    Ok(())
}
