// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core types for connectivity compilation.

Errors raised here abort the build step: every one of them is a caller
configuration mistake detected before enumeration or encoding starts.
*/

use serde::{Deserialize, Serialize};

/// Result type for connectivity operations
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// Errors that can occur while validating, enumerating or encoding connectivity
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<u32>, actual: Vec<u32> },

    #[error("Invalid sampling request: {0}")]
    InvalidSamplingRequest(String),

    #[error("Receptor type '{receptor}' not found on population '{population}'")]
    MissingReceptorType { receptor: String, population: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Malformed kernel spec: {0}")]
    MalformedKernelSpec(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Region size mismatch: reserved {expected} bytes, needed {actual}")]
    RegionSizeMismatch { expected: usize, actual: usize },
}

/// Signed S16.15 fixed-point value as stored in synaptic rows.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FixedPoint(i32);

impl FixedPoint {
    pub const FRACTIONAL_BITS: u32 = 15;
    const ONE: f64 = (1u32 << Self::FRACTIONAL_BITS) as f64;

    /// Convert from a real value, rounding to nearest and saturating at the i32 range.
    /// NaN maps to zero.
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self(0);
        }
        let scaled = (value * Self::ONE).round();
        Self(scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32)
    }

    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::ONE
    }
}

/// Two-dimensional extent in (rows, columns) order, as used by kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent2 {
    pub height: u32,
    pub width: u32,
}

impl Extent2 {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Read a population shape, which stores width first.
    pub fn from_population_shape(shape: &[u32]) -> ConnectivityResult<Self> {
        match shape {
            [width, height] => Ok(Self::new(*height, *width)),
            _ => Err(ConnectivityError::InvalidGeometry(format!(
                "expected a 2D shape, got {} dimensions",
                shape.len()
            ))),
        }
    }

    /// Back to population order (width, height).
    pub fn to_population_shape(self) -> Vec<u32> {
        vec![self.width, self.height]
    }

    pub fn area(self) -> u32 {
        self.height * self.width
    }
}
