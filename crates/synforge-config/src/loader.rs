// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Values are layered in this order, later layers winning:
//! 1. TOML file
//! 2. Environment variables
//! 3. CLI arguments

use crate::{ConfigError, ConfigResult, SynforgeConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "synforge.toml";
const CONFIG_PATH_VAR: &str = "SYNFORGE_CONFIG_PATH";

/// Find the synforge configuration file
///
/// Search order:
/// 1. `SYNFORGE_CONFIG_PATH` environment variable
/// 2. `./synforge.toml`
/// 3. `synforge.toml` in up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_VAR) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_VAR,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|path| path.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_VAR
    )))
}

/// Load configuration from a TOML file and apply overrides
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns an error if the file is missing, holds invalid TOML, or an
/// override value does not parse
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SynforgeConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: SynforgeConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }
    Ok(config)
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}' does not parse", name, value)))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `SYNFORGE_FAILURE_CHANCE` -> `bounds.failure_chance`
/// - `SYNFORGE_TIME_STEP_MS` -> `timing.time_step_ms`
/// - `SYNFORGE_SEED` -> `build.seed`
/// - `SYNFORGE_LOG_LEVEL` -> `logging.level`
/// - `SYNFORGE_DIAGNOSTICS_DIR` -> `diagnostics.output_dir` (also enables dumps)
pub fn apply_environment_overrides(config: &mut SynforgeConfig) -> ConfigResult<()> {
    if let Ok(value) = env::var("SYNFORGE_FAILURE_CHANCE") {
        config.bounds.failure_chance = parse_value("SYNFORGE_FAILURE_CHANCE", &value)?;
    }
    if let Ok(value) = env::var("SYNFORGE_TIME_STEP_MS") {
        config.timing.time_step_ms = parse_value("SYNFORGE_TIME_STEP_MS", &value)?;
    }
    if let Ok(value) = env::var("SYNFORGE_SEED") {
        config.build.seed = parse_value("SYNFORGE_SEED", &value)?;
    }
    if let Ok(value) = env::var("SYNFORGE_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("SYNFORGE_DIAGNOSTICS_DIR") {
        config.diagnostics.output_dir = PathBuf::from(value);
        config.diagnostics.enabled = true;
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// Keys are section-free names such as `seed`, `failure_chance`,
/// `time_step_ms`, `max_local_delay`, `filter_edges`, `diagnostics_dir` and
/// `log_level`. Unknown keys are ignored.
pub fn apply_cli_overrides(
    config: &mut SynforgeConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("failure_chance") {
        config.bounds.failure_chance = parse_value("failure_chance", value)?;
    }
    if let Some(value) = cli_args.get("exact_trial_limit") {
        config.bounds.exact_trial_limit = parse_value("exact_trial_limit", value)?;
    }
    if let Some(value) = cli_args.get("time_step_ms") {
        config.timing.time_step_ms = parse_value("time_step_ms", value)?;
    }
    if let Some(value) = cli_args.get("max_local_delay") {
        config.device.max_local_delay_steps = parse_value("max_local_delay", value)?;
    }
    if let Some(value) = cli_args.get("seed") {
        config.build.seed = parse_value("seed", value)?;
    }
    if let Some(value) = cli_args.get("filter_edges") {
        config.build.filter_edges = parse_flag(value);
    }
    if let Some(value) = cli_args.get("diagnostics_dir") {
        config.diagnostics.output_dir = PathBuf::from(value);
        config.diagnostics.enabled = true;
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const OVERRIDE_VARS: [&str; 5] = [
        "SYNFORGE_FAILURE_CHANCE",
        "SYNFORGE_TIME_STEP_MS",
        "SYNFORGE_SEED",
        "SYNFORGE_LOG_LEVEL",
        "SYNFORGE_DIAGNOSTICS_DIR",
    ];

    fn clear_override_vars() {
        for var in OVERRIDE_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom.toml");
        File::create(&config_path).unwrap();

        env::set_var(CONFIG_PATH_VAR, config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_VAR);

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        env::set_var(CONFIG_PATH_VAR, missing.to_str().unwrap());
        let result = find_config_file();
        env::remove_var(CONFIG_PATH_VAR);

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_override_vars();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[bounds]").unwrap();
        writeln!(file, "failure_chance = 1e-4").unwrap();
        writeln!(file, "[device]").unwrap();
        writeln!(file, "max_local_delay_steps = 32").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();
        assert_eq!(config.bounds.failure_chance, 1e-4);
        assert_eq!(config.device.max_local_delay_steps, 32);
        assert_eq!(config.timing.time_step_ms, 1.0);
    }

    #[test]
    fn test_invalid_toml() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[device\nmax_local_delay_steps = ").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = SynforgeConfig::default();

        env::set_var("SYNFORGE_SEED", "1234");
        env::set_var("SYNFORGE_TIME_STEP_MS", "0.1");
        env::set_var("SYNFORGE_DIAGNOSTICS_DIR", "/tmp/synforge");
        let result = apply_environment_overrides(&mut config);
        clear_override_vars();

        result.unwrap();
        assert_eq!(config.build.seed, 1234);
        assert_eq!(config.timing.time_step_ms, 0.1);
        assert!(config.diagnostics.enabled);
        assert_eq!(config.diagnostics.output_dir, PathBuf::from("/tmp/synforge"));
    }

    #[test]
    fn test_unparsable_environment_value() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = SynforgeConfig::default();

        env::set_var("SYNFORGE_SEED", "many");
        let result = apply_environment_overrides(&mut config);
        clear_override_vars();

        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = SynforgeConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("max_local_delay".to_string(), "64".to_string());
        cli_args.insert("filter_edges".to_string(), "false".to_string());
        cli_args.insert("unknown".to_string(), "ignored".to_string());

        apply_cli_overrides(&mut config, &cli_args).unwrap();

        assert_eq!(config.device.max_local_delay_steps, 64);
        assert!(!config.build.filter_edges);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        clear_override_vars();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[build]").unwrap();
        writeln!(file, "seed = 1").unwrap();
        writeln!(file, "[logging]").unwrap();
        writeln!(file, "level = \"warn\"").unwrap();

        env::set_var("SYNFORGE_SEED", "2");
        env::set_var("SYNFORGE_LOG_LEVEL", "debug");

        let mut cli_args = HashMap::new();
        cli_args.insert("seed".to_string(), "3".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args));
        clear_override_vars();
        let config = config.unwrap();

        // CLI wins for the seed, environment wins for the level
        assert_eq!(config.build.seed, 3);
        assert_eq!(config.logging.level, "debug");
    }
}
