//! `flexfeed`: FLEX feed converter and resampler.
//!
//! Subcommands:
//!   - `convert`  Decode zip/gzip captures into raw tick stores
//!   - `resample` Aggregate raw stores into fixed-interval bars
//!   - `fetch`    Download captures over HTTP(S), then convert them

mod fetch;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use flex_bars::{resample_file, resample_output_path};
use flex_core::{Config, Interval};
use flex_ingestion::archive::{output_path, session_date};
use flex_ingestion::convert_file;
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::fetch::{remote_file_name, Remote};

#[derive(Parser, Debug)]
#[command(name = "flexfeed", version, about = "FLEX market data converter", propagate_version = true)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert feed archives into raw stores
    Convert(ConvertArgs),
    /// Resample raw stores into OHLC/volume/amount bars
    Resample(ResampleArgs),
    /// Download feed archives and convert them
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Suffix appended to output basenames
    #[arg(long)]
    suffix: Option<String>,

    /// Session date (YYYY-MM-DD or YYYYMMDD); defaults to the file name's date
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Zip or gzip feed archives
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct ResampleArgs {
    /// Bar interval (e.g. 1s, 500ms, 5min, 1h)
    #[arg(short, long)]
    freq: Option<Interval>,

    /// Raw stores produced by `convert`
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Archive server host
    #[arg(long)]
    host: String,

    /// Archive server port
    #[arg(long)]
    port: Option<u16>,

    /// Login user
    #[arg(long)]
    user: String,

    /// Directory for raw stores
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Suffix appended to output basenames
    #[arg(long)]
    suffix: Option<String>,

    /// Remote archive paths
    #[arg(required = true)]
    remote: Vec<String>,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|e| format!("invalid date {s:?}: {e}"))
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path).with_context(|| format!("loading config {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Remove a partially written store and its write-ahead log.
fn discard(output: &Path) {
    let mut wal = output.as_os_str().to_owned();
    wal.push(".wal");
    for path in [output.to_path_buf(), PathBuf::from(wal)] {
        match std::fs::remove_file(&path) {
            Ok(()) => warn!(path = %path.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "could not remove partial output: {e}"),
        }
    }
}

/// Run `job` over every item in parallel and report each outcome.
/// Returns the number of failures.
fn run_all<T, F>(items: &[T], label: impl Fn(&T) -> String + Sync, job: F) -> usize
where
    T: Sync,
    F: Fn(&T) -> Result<PathBuf> + Sync,
{
    let results: Vec<(String, Result<PathBuf>)> = items.par_iter().map(|item| (label(item), job(item))).collect();

    let mut failed = 0;
    for (name, result) in results {
        match result {
            Ok(output) => info!("{name} -> {}", output.display()),
            Err(err) => {
                error!("{name}: {err:#}");
                failed += 1;
            }
        }
    }
    failed
}

/// Raw store path for `src`, placed in `out_dir`.
fn planned_output(src: &Path, out_dir: &Path, suffix: &str, config: &Config) -> Result<PathBuf> {
    let name = src.file_name().context("source has no file name")?;
    Ok(output_path(&out_dir.join(name), suffix, &config.store.extension)?)
}

/// Fail when two inputs would write the same output.
fn reject_duplicate_outputs(outputs: impl IntoIterator<Item = PathBuf>) -> Result<()> {
    let mut seen = HashSet::new();
    for output in outputs {
        if !seen.insert(output.clone()) {
            anyhow::bail!("several inputs would write {}", output.display());
        }
    }
    Ok(())
}

fn convert_one(src: &Path, out_dir: &Path, suffix: &str, date: Option<NaiveDate>, config: &Config) -> Result<PathBuf> {
    let date = match date {
        Some(date) => date,
        None => session_date(src)?,
    };
    let output = planned_output(src, out_dir, suffix, config)?;

    if let Err(err) = convert_file(src, &output, date, config) {
        discard(&output);
        return Err(err).with_context(|| format!("converting {}", src.display()));
    }
    Ok(output)
}

fn convert(args: ConvertArgs, config: &Config) -> Result<usize> {
    let suffix = args.suffix.as_deref().unwrap_or(&config.store.raw_suffix);
    reject_duplicate_outputs(args.files.iter().filter_map(|src| {
        let dir = src.parent().unwrap_or_else(|| Path::new(""));
        planned_output(src, dir, suffix, config).ok()
    }))?;
    Ok(run_all(
        &args.files,
        |src| src.display().to_string(),
        |src| {
            let dir = src.parent().unwrap_or_else(|| Path::new(""));
            convert_one(src, dir, suffix, args.date, config)
        },
    ))
}

fn resample(args: ResampleArgs, config: &Config) -> Result<usize> {
    let interval = match args.freq {
        Some(interval) => interval,
        None => config.resample.interval()?,
    };
    reject_duplicate_outputs(
        args.files
            .iter()
            .map(|src| resample_output_path(src, interval, &config.store.extension)),
    )?;
    Ok(run_all(
        &args.files,
        |src| src.display().to_string(),
        |src| {
            let output = resample_output_path(src, interval, &config.store.extension);
            if let Err(err) = resample_file(src, &output, interval, &config.resample) {
                discard(&output);
                return Err(err).with_context(|| format!("resampling {}", src.display()));
            }
            Ok(output)
        },
    ))
}

fn fetch(args: FetchArgs, config: &Config) -> Result<usize> {
    let suffix = args.suffix.as_deref().unwrap_or(&config.store.raw_suffix);
    reject_duplicate_outputs(args.remote.iter().filter_map(|path| {
        let name = remote_file_name(path).ok()?;
        planned_output(Path::new(name), &args.out_dir, suffix, config).ok()
    }))?;
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let remote = Remote::connect(&args.host, args.port, &args.user, &config.fetch)?;

    Ok(run_all(
        &args.remote,
        |path| path.clone(),
        |path| {
            let staging = tempfile::tempdir_in(&args.out_dir)?;
            let archive = remote.fetch_archive(path, staging.path())?;
            convert_one(&archive, &args.out_dir, suffix, None, config)
        },
    ))
}

fn run(cli: Cli) -> Result<usize> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Convert(args) => convert(args, &config),
        Commands::Resample(args) => resample(args, &config),
        Commands::Fetch(args) => fetch(args, &config),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(failed, "some files failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
