// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Weight and delay descriptors attached to a connection request.
*/

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{ConnectivityError, ConnectivityResult};

/// How a per-connection value (weight or delay) is chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterDescriptor {
    /// The same value for every connection
    Fixed(f64),
    /// Drawn uniformly from `[low, high)`
    Uniform { low: f64, high: f64 },
    /// Drawn uniformly from a list of values
    Choice(Vec<f64>),
}

impl ParameterDescriptor {
    pub fn validate(&self, name: &str) -> ConnectivityResult<()> {
        let finite = match self {
            Self::Fixed(value) => value.is_finite(),
            Self::Uniform { low, high } => low.is_finite() && high.is_finite() && low <= high,
            Self::Choice(values) => values.iter().all(|v| v.is_finite()),
        };
        if finite {
            Ok(())
        } else {
            Err(ConnectivityError::InvalidParameter(format!(
                "{} descriptor {:?} must be finite with low <= high",
                name, self
            )))
        }
    }

    pub fn fixed_value(&self) -> Option<f64> {
        match self {
            Self::Fixed(value) => Some(*value),
            Self::Uniform { low, high } if low == high => Some(*low),
            Self::Choice(values) if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }

    /// Smallest value that can be produced; 0 for an empty choice
    pub fn min(&self) -> f64 {
        match self {
            Self::Fixed(value) => *value,
            Self::Uniform { low, .. } => *low,
            Self::Choice(values) => values.iter().copied().reduce(f64::min).unwrap_or(0.0),
        }
    }

    /// Largest value that can be produced; 0 for an empty choice
    pub fn max(&self) -> f64 {
        match self {
            Self::Fixed(value) => *value,
            Self::Uniform { high, .. } => *high,
            Self::Choice(values) => values.iter().copied().reduce(f64::max).unwrap_or(0.0),
        }
    }

    pub fn max_abs(&self) -> f64 {
        self.min().abs().max(self.max().abs())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Fixed(value) => *value,
            Self::Uniform { low, high } => {
                if low < high {
                    rng.gen_range(*low..*high)
                } else {
                    *low
                }
            }
            Self::Choice(values) => {
                if values.is_empty() {
                    0.0
                } else {
                    values[rng.gen_range(0..values.len())]
                }
            }
        }
    }

    /// Probability that a produced value falls in `[lo, hi]`
    pub fn probability_within(&self, lo: f64, hi: f64) -> f64 {
        if hi < lo {
            return 0.0;
        }
        if let Some(value) = self.fixed_value() {
            return if (lo..=hi).contains(&value) { 1.0 } else { 0.0 };
        }
        match self {
            Self::Uniform { low, high } => {
                let overlap = hi.min(*high) - lo.max(*low);
                (overlap / (high - low)).clamp(0.0, 1.0)
            }
            Self::Choice(values) => {
                if values.is_empty() {
                    return 0.0;
                }
                let inside = values.iter().filter(|v| (lo..=hi).contains(*v)).count();
                inside as f64 / values.len() as f64
            }
            Self::Fixed(_) => 0.0,
        }
    }
}
