// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What `init_logging` installs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Base level for crates without a debug flag (trace, debug, info, warn, error)
    pub level: String,
    /// Show event targets on the console
    pub console_targets: bool,
    /// Log files; honoured only with the `file-logging` feature
    pub file: Option<FileLoggingSettings>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_targets: false,
            file: None,
        }
    }
}

impl LoggingSettings {
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    pub fn with_file_logging(mut self, file: FileLoggingSettings) -> Self {
        self.file = Some(file);
        self
    }
}

/// Run folders under `dir`, pruned by age and count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLoggingSettings {
    pub dir: PathBuf,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for FileLoggingSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LoggingSettings::default();
        assert_eq!(settings.level, "info");
        assert!(settings.file.is_none());

        let with_files = LoggingSettings::with_level("debug")
            .with_file_logging(FileLoggingSettings::default());
        assert_eq!(with_files.level, "debug");
        assert_eq!(with_files.file.map(|f| f.retention_runs), Some(10));
    }
}
