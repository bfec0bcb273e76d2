// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Every check runs and all violations are reported together.

use crate::{ConfigError, ConfigResult, SynforgeConfig};

/// Largest value the device stores in a 16-bit delay field
const MAX_DEVICE_DELAY: u32 = u16::MAX as u32;
/// Colour bits live in a 3-bit field of the source header
const MAX_COLOUR_BITS: u8 = 7;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    OutOfRange { field: String, value: String, range: String },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { field, value, range } => {
                write!(f, "{} = {} is outside {}", field, value, range)
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation
pub fn validate_config(config: &SynforgeConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if errors.is_empty() {
        return Ok(());
    }

    let error_messages = errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::ValidationError(format!(
        "Configuration validation failed:\n{}",
        error_messages
    )))
}

/// All violations, in section order
pub fn collect_errors(config: &SynforgeConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_bounds(config, &mut errors);
    validate_timing(config, &mut errors);
    validate_device(config, &mut errors);
    validate_outputs(config, &mut errors);
    errors
}

fn validate_bounds(config: &SynforgeConfig, errors: &mut Vec<ConfigValidationError>) {
    let chance = config.bounds.failure_chance;
    if !(chance > 0.0 && chance < 1.0) {
        errors.push(ConfigValidationError::OutOfRange {
            field: "bounds.failure_chance".to_string(),
            value: chance.to_string(),
            range: "(0, 1)".to_string(),
        });
    }
}

fn validate_timing(config: &SynforgeConfig, errors: &mut Vec<ConfigValidationError>) {
    let step = config.timing.time_step_ms;
    if !(step.is_finite() && step > 0.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "timing.time_step_ms".to_string(),
            reason: format!("{} is not a positive duration", step),
        });
    }
}

fn validate_device(config: &SynforgeConfig, errors: &mut Vec<ConfigValidationError>) {
    let device = &config.device;
    if device.max_local_delay_steps == 0 || device.max_local_delay_steps > MAX_DEVICE_DELAY {
        errors.push(ConfigValidationError::OutOfRange {
            field: "device.max_local_delay_steps".to_string(),
            value: device.max_local_delay_steps.to_string(),
            range: format!("1..={}", MAX_DEVICE_DELAY),
        });
    }
    if device.max_atoms_per_core == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.max_atoms_per_core".to_string(),
            reason: "a core must hold at least one atom".to_string(),
        });
    }
    if device.n_colour_bits > MAX_COLOUR_BITS {
        errors.push(ConfigValidationError::OutOfRange {
            field: "device.n_colour_bits".to_string(),
            value: device.n_colour_bits.to_string(),
            range: format!("0..={}", MAX_COLOUR_BITS),
        });
    }
}

fn validate_outputs(config: &SynforgeConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.diagnostics.enabled && config.diagnostics.output_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "diagnostics.output_dir".to_string(),
        });
    }
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: format!("'{}' is not one of {:?}", config.logging.level, LOG_LEVELS),
        });
    }
}
