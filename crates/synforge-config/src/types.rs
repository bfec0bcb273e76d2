// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `synforge.toml`. Every field has a
//! default, so a file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SynforgeConfig {
    pub bounds: BoundsConfig,
    pub timing: TimingConfig,
    pub device: DeviceConfig,
    pub build: BuildConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// Capacity bound estimation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BoundsConfig {
    /// Tolerated chance of a buffer bound being exceeded
    pub failure_chance: f64,
    /// Largest trial count evaluated with the exact binomial tail
    pub exact_trial_limit: u64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            failure_chance: 1e-5,
            exact_trial_limit: 1_000_000,
        }
    }
}

/// Simulation timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub time_step_ms: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { time_step_ms: 1.0 }
    }
}

/// Limits of the target cores
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Longest delay a core holds without a delay stage
    pub max_local_delay_steps: u32,
    pub max_atoms_per_core: u32,
    /// Colour bits reserved in routing keys
    pub n_colour_bits: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_local_delay_steps: 16,
            max_atoms_per_core: 2048,
            n_colour_bits: 0,
        }
    }
}

/// Build behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Seed for every random draw; 0 draws a fresh seed from entropy
    pub seed: u64,
    /// Skip routing pre tiles outside a convolution's receptive field
    pub filter_edges: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            filter_edges: true,
        }
    }
}

/// Selection dumps written while building
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SynforgeConfig = toml::from_str(
            r#"
            [device]
            max_local_delay_steps = 8

            [build]
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.device.max_local_delay_steps, 8);
        assert_eq!(config.device.max_atoms_per_core, 2048);
        assert_eq!(config.build.seed, 42);
        assert!(config.build.filter_edges);
        assert_eq!(config.bounds, BoundsConfig::default());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let mut config = SynforgeConfig::default();
        config.diagnostics.enabled = true;
        config.diagnostics.output_dir = PathBuf::from("/tmp/dumps");
        let text = toml::to_string(&config).unwrap();
        let parsed: SynforgeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
