// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # synforge-observability
//!
//! Logging setup shared by the synforge crates, with per-crate debug flags.
//!
//! ## Features
//! - `file-logging`: JSON log files in a timestamped run folder, with retention

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Tracing target used by the umbrella crate
pub const UMBRELLA_TARGET: &str = "synforge";

/// Known synforge crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    UMBRELLA_TARGET,
    "synforge-config",
    "synforge-connectivity",
    "synforge-observability",
];
