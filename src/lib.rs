// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Synforge
//!
//! Compiles abstract connectivity rules for many-core neuromorphic targets
//! into synapse lists, device parameter blocks and multicast routing keys.
//!
//! This crate ties the workspace together: it re-exports the connectivity
//! compiler and adds a [`BuildSession`] configured from `synforge.toml`.
//!
//! ## Feature Flags
//! - **`parallel`** (default): row enumeration via rayon
//! - **`file-logging`**: per-run JSON log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synforge::prelude::*;
//!
//! let config = synforge::config::load_config(None, None)?;
//! let _logging = synforge::init_logging(&config)?;
//! let mut session = BuildSession::from_config(&config)?;
//!
//! let pre = Arc::new(Population::new(0, "retina", vec![32, 32], &["excitatory"])?);
//! let post = Arc::new(Population::new(1, "v1", vec![1000], &["excitatory"])?);
//! let request = session.request(0, pre, post).receptor("excitatory").build()?;
//! let mut projection = Projection::new(request, FixedProbabilityConnector::new(0.1, true)?)?;
//! let block = session.build_block(&mut projection, &VertexSlice::linear(0, 255)?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: synforge-config, synforge-observability    │
//! │  (TOML + overrides, logging setup)                      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: synforge-connectivity                      │
//! │  (bounds, connectors, device encoding, routing keys)    │
//! └─────────────────────────────────────────────────────────┘
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod session;

pub use synforge_config as config;
pub use synforge_connectivity as connectivity;
pub use synforge_observability as observability;

pub use session::BuildSession;

use synforge_config::{ConfigError, SynforgeConfig};
use synforge_connectivity::ConnectivityError;
use synforge_observability::{LoggingGuard, LoggingSettings};

#[derive(Debug, thiserror::Error)]
pub enum SynforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connectivity error: {0}")]
    Connectivity(#[from] ConnectivityError),
}

pub type SynforgeResult<T> = Result<T, SynforgeError>;

/// Install logging at the configured level, with debug flags from the
/// command line and `SYNFORGE_DEBUG`
pub fn init_logging(config: &SynforgeConfig) -> anyhow::Result<LoggingGuard> {
    let settings = LoggingSettings::with_level(config.logging.level.clone());
    #[cfg(feature = "file-logging")]
    let settings =
        settings.with_file_logging(synforge_observability::FileLoggingSettings::default());
    synforge_observability::init_logging(&synforge_observability::parse_debug_flags(), &settings)
}

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::session::BuildSession;
    pub use crate::{SynforgeError, SynforgeResult};
    pub use synforge_config::SynforgeConfig;
    pub use synforge_connectivity::prelude::*;
}
