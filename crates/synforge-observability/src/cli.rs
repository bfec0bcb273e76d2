// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-crate debug flags
//!
//! Flags look like `--debug-synforge-connectivity`; `--debug-all` turns on
//! every known crate. `SYNFORGE_DEBUG` takes a comma-separated list or `all`.

use std::collections::BTreeSet;
use std::env;

use crate::KNOWN_CRATES;

pub const DEBUG_ENV_VAR: &str = "SYNFORGE_DEBUG";

/// Crates whose debug output is switched on
///
/// # Example
/// ```rust
/// use synforge_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-synforge-connectivity".to_string()]);
/// assert!(flags.is_enabled("synforge-connectivity"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrateDebugFlags {
    enabled_crates: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Collect `--debug-{crate}` and `--debug-all` from an argument list.
    /// Other arguments are ignored.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enable(crate_name);
            }
        }
        flags
    }

    /// Merge a `SYNFORGE_DEBUG` style value: `all` or comma-separated names
    pub fn merge_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',').map(str::trim) {
            if !crate_name.is_empty() {
                self.enable(crate_name);
            }
        }
    }

    pub fn enable(&mut self, crate_name: &str) {
        self.enabled_crates.insert(crate_name.to_string());
    }

    pub fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enable(crate_name);
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(crate_name)
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    pub fn enabled_crates(&self) -> impl Iterator<Item = &str> {
        self.enabled_crates.iter().map(String::as_str)
    }

    /// `DEBUG` for enabled crates, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// `EnvFilter` directives: each enabled crate at debug, then `base_level`
    /// for everything else
    pub fn to_filter_string(&self, base_level: &str) -> String {
        self.enabled_crates
            .iter()
            .map(|crate_name| format!("{}=debug", crate_name))
            .chain(std::iter::once(base_level.to_lowercase()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Flags from the process arguments plus `SYNFORGE_DEBUG`
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var(DEBUG_ENV_VAR) {
        flags.merge_env_value(&value);
    }
    flags
}

pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for one crate

Available crates:
  {}

Environment Variable:
  {var}={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  {var}=all                               Enable debug for all crates
"#,
        KNOWN_CRATES.join(", "),
        var = DEBUG_ENV_VAR
    )
}
