// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization
//!
//! Console output is always installed. With the `file-logging` feature and
//! file settings present, every run also gets its own folder:
//! ```text
//! ./logs/
//!   └── run_20250101_120000/
//!       ├── synforge-connectivity.log
//!       ├── synforge-config.log
//!       ├── synforge-observability.log
//!       └── synforge.log (combined)
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::LoggingSettings;

const RUN_PREFIX: &str = "run_";
const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
/// Upper clamp on the age window, about a century
const MAX_RETENTION_DAYS: u64 = 36_500;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps file writers alive; logs are flushed when it drops
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    fn console_only() -> Self {
        Self {
            #[cfg(feature = "file-logging")]
            _file_guards: Vec::new(),
            log_dir: None,
        }
    }

    /// Run folder of this process, when file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails when the filter does not parse, the run folder cannot be created,
/// or a global subscriber is already set.
pub fn init_logging(
    debug_flags: &CrateDebugFlags,
    settings: &LoggingSettings,
) -> Result<LoggingGuard> {
    let filter = debug_flags.to_filter_string(&settings.level);
    let env_filter =
        EnvFilter::try_new(&filter).with_context(|| format!("Invalid log filter: {}", filter))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_target(settings.console_targets)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter)
            .boxed(),
    );

    #[cfg(feature = "file-logging")]
    let guard = match &settings.file {
        Some(file) => file_layers(file, &filter, &mut layers)?,
        None => LoggingGuard::console_only(),
    };
    #[cfg(not(feature = "file-logging"))]
    let guard = LoggingGuard::console_only();

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    warn_if_files_unsupported(settings);
    Ok(guard)
}

#[cfg(not(feature = "file-logging"))]
fn warn_if_files_unsupported(settings: &LoggingSettings) {
    if settings.file.is_some() {
        tracing::warn!(
            target: "synforge-observability",
            "File logging requested but the file-logging feature is disabled"
        );
    }
}

#[cfg(feature = "file-logging")]
fn warn_if_files_unsupported(_settings: &LoggingSettings) {}

/// Console logging at `info`, debug flags from the process
pub fn init_logging_default() -> Result<LoggingGuard> {
    init_logging(&crate::cli::parse_debug_flags(), &LoggingSettings::default())
}

#[cfg(feature = "file-logging")]
fn file_layers(
    file: &crate::config::FileLoggingSettings,
    filter: &str,
    layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    let run_folder = file.dir.join(format!(
        "{}{}",
        RUN_PREFIX,
        Utc::now().format(RUN_TIMESTAMP_FORMAT)
    ));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;
    cleanup_old_logs(&file.dir, file.retention_days, file.retention_runs)?;

    let mut guards = Vec::new();
    let library_crates = crate::KNOWN_CRATES
        .iter()
        .filter(|name| **name != crate::UMBRELLA_TARGET);
    for crate_name in library_crates {
        let log_file = rolling::never(&run_folder, format!("{}.log", crate_name));
        let (writer, guard) = tracing_appender::non_blocking(log_file);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(EnvFilter::try_new(format!("{}=debug,off", crate_name))?)
                .boxed(),
        );
    }

    let combined_name = format!("{}.log", crate::UMBRELLA_TARGET);
    let (writer, guard) =
        tracing_appender::non_blocking(rolling::never(&run_folder, combined_name));
    guards.push(guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(EnvFilter::try_new(filter)?)
            .boxed(),
    );

    Ok(LoggingGuard {
        _file_guards: guards,
        log_dir: Some(run_folder),
    })
}

/// Start time encoded in a run folder name
pub fn parse_run_timestamp(folder_name: &str) -> Option<DateTime<Utc>> {
    let stamp = folder_name.strip_prefix(RUN_PREFIX)?;
    NaiveDateTime::parse_from_str(stamp, RUN_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Runs to delete: older than `retention_days`, or beyond the newest
/// `retention_runs`
pub fn expired_runs(
    mut runs: Vec<(PathBuf, DateTime<Utc>)>,
    now: DateTime<Utc>,
    retention_days: u64,
    retention_runs: usize,
) -> Vec<PathBuf> {
    let cutoff = now - Duration::days(retention_days.min(MAX_RETENTION_DAYS) as i64);
    runs.sort_by(|a, b| b.1.cmp(&a.1));
    runs.into_iter()
        .enumerate()
        .filter(|(rank, (_, started))| *rank >= retention_runs || *started < cutoff)
        .map(|(_, (path, _))| path)
        .collect()
}

/// Remove expired run folders under `base_log_dir`; returns how many went.
/// The newest run is always kept.
pub fn cleanup_old_logs(
    base_log_dir: &Path,
    retention_days: u64,
    retention_runs: usize,
) -> Result<usize> {
    if !base_log_dir.exists() {
        return Ok(0);
    }

    let mut runs = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let started = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_run_timestamp);
        if let Some(started) = started {
            runs.push((path, started));
        }
    }

    let mut removed = 0;
    for path in expired_runs(runs, Utc::now(), retention_days, retention_runs.max(1)) {
        // Subscriber not installed yet
        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!(
                "Warning: Failed to remove old log directory {}: {}",
                path.display(),
                e
            ),
        }
    }
    Ok(removed)
}
