#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `discharge` binary: battery discharge sessions and model extraction.

mod cli;
mod error_fmt;
mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use discharge_config::{Config, Logging};
use discharge_core::StopReason;
use eyre::WrapErr;
use serde_json::json;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, exit_code_for_stop, format_error_json, humanize};
use crate::run::{RunOptions, RunSummary, SelfCheck};

fn main() {
    let cli = Cli::parse();
    let _ = color_eyre::install();
    let _ = JSON_MODE.set(cli.json);

    let mut guard = None;
    let code = match real_main(&cli, &mut guard) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    // Flush the file sink before exiting.
    drop(guard);
    std::process::exit(code);
}

fn real_main(cli: &Cli, guard: &mut Option<WorkerGuard>) -> eyre::Result<i32> {
    let cfg = load_config(cli)?;
    *guard = init_tracing(cli, cfg.as_ref().map(|c| &c.logging))?;

    match &cli.cmd {
        Commands::Run {
            model_out,
            raw_out,
            beep,
        } => {
            let cfg = cfg.ok_or_else(|| eyre::eyre!("read config {}", cli.config.display()))?;
            let opts = RunOptions::resolve(&cfg, model_out.clone(), raw_out.clone(), *beep);

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;

            let summary = run::run_discharge(&cfg, &opts, &shutdown)?;
            print_run_summary(cli.json, &summary);
            Ok(exit_code_for_stop(summary.report.stop()))
        }
        Commands::Extract {
            raw,
            current_a,
            model_out,
        } => {
            let out = model_out.clone().unwrap_or_else(|| {
                let output = cfg.as_ref().map(|c| c.output.model_file.clone());
                PathBuf::from(output.unwrap_or_else(|| "battery_model.csv".to_string()))
            });
            let model = run::extract_from_raw(raw, *current_a, &out)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "timestamp": chrono::Utc::now().timestamp(),
                        "raw_file": raw.display().to_string(),
                        "model_file": out.display().to_string(),
                        "capacity_ah": model.capacity_ah,
                        "degraded": model.is_degraded(),
                    })
                );
            } else {
                println!("Model written to {}", out.display());
                println!("  capacity: {:.4} Ah", model.capacity_ah);
                if let Some(adv) = model.advisory {
                    println!("  warning: {adv}");
                }
            }
            Ok(0)
        }
        Commands::SelfCheck => {
            let cfg = cfg.ok_or_else(|| eyre::eyre!("read config {}", cli.config.display()))?;
            let SelfCheck { idn, voc } = run::self_check(&cfg)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "timestamp": chrono::Utc::now().timestamp(),
                        "idn": idn,
                        "voc_v": voc,
                    })
                );
            } else {
                println!("Instrument: {idn}");
                println!("Open-circuit voltage: {voc:.4} V");
                println!("OK");
            }
            Ok(0)
        }
    }
}

/// `extract` runs without a config file when none exists at the given path.
fn load_config(cli: &Cli) -> eyre::Result<Option<Config>> {
    if matches!(cli.cmd, Commands::Extract { .. }) && !cli.config.exists() {
        return Ok(None);
    }
    let cfg = discharge_config::load_file(&cli.config)?;
    cfg.validate()?;
    Ok(Some(cfg))
}

fn init_tracing(cli: &Cli, logging: Option<&Logging>) -> eyre::Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    // stdout carries summaries, so console logs go to stderr
    let console: Box<dyn Layer<Registry> + Send + Sync> = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let mut guard = None;
    let file = logging
        .and_then(|l| l.file.as_deref().map(|path| (l, Path::new(path))))
        .map(|(l, path)| {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map_or_else(|| "discharge.log".into(), ToOwned::to_owned);
            let appender = match l.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(l.level.as_deref().unwrap_or("info")))
        });

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(guard)
}

fn print_run_summary(json_mode: bool, s: &RunSummary) {
    let outcome = &s.report.outcome;
    let model = s.report.model.as_ref();
    if json_mode {
        println!(
            "{}",
            json!({
                "timestamp": chrono::Utc::now().timestamp(),
                "idn": s.idn,
                "profile": s.profile,
                "initial_voc_v": s.initial_voc,
                "stop_reason": outcome.stop.as_str(),
                "samples": outcome.series.len(),
                "duration_s": outcome.duration_s,
                "capacity_ah": outcome.capacity_ah(),
                "model_file": s.model_file.as_ref().map(|p| p.display().to_string()),
                "raw_file": s.raw_file.as_ref().map(|p| p.display().to_string()),
                "degraded": model.map(discharge_core::BatteryModel::is_degraded),
            })
        );
        return;
    }

    let headline = match outcome.stop {
        StopReason::CutoffReached => "Discharge complete",
        StopReason::UserCancelled => "Discharge cancelled",
        _ => "Discharge stopped",
    };
    println!("{headline}: {}", outcome.stop);
    println!("  instrument: {}", s.idn);
    println!(
        "  profile: {}, initial Voc: {:.4} V",
        s.profile, s.initial_voc
    );
    println!(
        "  samples: {}, duration: {:.1} s, capacity: {:.4} Ah",
        outcome.series.len(),
        outcome.duration_s,
        outcome.capacity_ah()
    );
    if let Some(path) = &s.model_file {
        println!("  model: {}", path.display());
    }
    if let Some(path) = &s.raw_file {
        println!("  raw data: {}", path.display());
    }
    if let Some(adv) = model.and_then(|m| m.advisory) {
        println!("  warning: {adv}");
    }
}
