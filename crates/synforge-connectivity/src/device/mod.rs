// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Device-side encodings.

Rather than shipping full connection lists, compact descriptors are written
into fixed-layout binary regions that firmware expands on the core:

- `division`: multiply-and-shift division constants
- `writer`: pre-sized little-endian region writer
- `generator`: parameter words and seeds for on-core connection generators
- `local_only`: per-core parameter and kernel weight regions for
  convolution and dense pooling
*/

pub mod division;
pub mod generator;
pub mod local_only;
pub mod writer;

pub use division::{div_const, DivisionConstant};
pub use generator::{kiss_seed, SeedCache};
pub use local_only::{IncomingProjection, LocalOnlyEncoder, LocalOnlyRegions, SourceVertex};
pub use writer::{pad_to_word, RegionWriter};

use crate::population::VertexSlice;
use crate::types::{ConnectivityError, ConnectivityResult};

/// Multiplier from weight units to device integers, per synapse type
#[derive(Debug, Clone, PartialEq)]
pub struct WeightScales(Vec<f64>);

impl WeightScales {
    pub fn new(scales: Vec<f64>) -> Self {
        Self(scales)
    }

    pub fn scale_for(&self, synapse_type: u8) -> ConnectivityResult<f64> {
        self.0
            .get(usize::from(synapse_type))
            .copied()
            .ok_or_else(|| {
                ConnectivityError::InvalidParameter(format!(
                    "no weight scale for synapse type {}",
                    synapse_type
                ))
            })
    }

    /// Scale and round a signed weight, picking the scale by sign
    pub fn encode_signed(
        &self,
        weight: f64,
        positive_type: u8,
        negative_type: u8,
    ) -> ConnectivityResult<i16> {
        let scale = if weight < 0.0 {
            self.scale_for(negative_type)?
        } else {
            self.scale_for(positive_type)?
        };
        Ok(saturating_i16(weight * scale))
    }
}

pub(crate) fn saturating_i16(value: f64) -> i16 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Identifier telling the device how to interpret a parameter block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DeviceEncodingId {
    OneToOne = 0,
    AllToAll = 1,
    FixedProbability = 2,
    FixedNumberPre = 4,
    FixedNumberPost = 5,
    LocalOnlyConvolution = 16,
    LocalOnlyPoolDense = 17,
}

impl DeviceEncodingId {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Encoded by [`LocalOnlyEncoder`] rather than an on-core generator
    pub fn is_local_only(self) -> bool {
        matches!(self, Self::LocalOnlyConvolution | Self::LocalOnlyPoolDense)
    }
}

/// Per-core facts a connector needs to write its parameter block
#[derive(Debug, Clone, Copy)]
pub struct DeviceTarget<'a> {
    pub post_slice: &'a VertexSlice,
    pub weight_scales: &'a WeightScales,
    pub delay_stage: u16,
    pub local_delay: u16,
    /// Offset of this connector's kernel in the weight region, in shorts
    pub weight_index: u16,
}
