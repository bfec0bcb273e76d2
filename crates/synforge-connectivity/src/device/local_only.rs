// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Parameter and weight regions for cores that expand connectivity locally.

Layout of the parameter region, all little-endian u32:

```text
header      n_post_atoms, n_sources, n_connectors
per source  key, mask,
            n_connectors << 16 | n_colour_bits << 13 | first_connector,
            mask_shift << 16 | core_mask,
            n_dims,
            9 words per dimension, most significant dimension first
connectors  one block per incoming projection, grouped by source
```

Convolution kernels go to a separate weight region; each block refers to its
kernel by offset.
*/

use ahash::AHashMap;
use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info};

use super::division::div_const;
use super::writer::{pad_to_word, RegionWriter, BYTES_PER_SHORT, BYTES_PER_WORD};
use super::{DeviceTarget, WeightScales};
use crate::population::VertexSlice;
use crate::request::Projection;
use crate::routing::SourceRouting;
use crate::types::{ConnectivityError, ConnectivityResult};

const HEADER_WORDS: usize = 3;
const SOURCE_WORDS: usize = 5;
const DIMENSION_WORDS: usize = 9;
const MAX_FIRST_CONNECTOR: usize = (1 << 13) - 1;

/// A pre population as seen by a receiving core
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVertex {
    pub id: u32,
    /// Population shape, dimension 0 first
    pub shape: Vec<u32>,
    /// Atoms per core in each dimension
    pub core_shape: Vec<u32>,
    pub routing: SourceRouting,
}

impl SourceVertex {
    fn check(&self) -> ConnectivityResult<()> {
        if self.shape.is_empty()
            || self.shape.len() != self.core_shape.len()
            || self.shape.contains(&0)
            || self.core_shape.contains(&0)
        {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "source {} has shape {:?} with per-core shape {:?}",
                self.id, self.shape, self.core_shape
            )));
        }
        Ok(())
    }

    /// Nine words per dimension, least significant dimension first
    fn dimension_words(&self) -> ConnectivityResult<Vec<[u32; DIMENSION_WORDS]>> {
        let mut cum_size = 1u32;
        let mut cum_cores = 1u32;
        let mut cum_last = 1u32;
        let mut dims = Vec::with_capacity(self.shape.len());
        for (&size, &core_size) in self.shape.iter().zip(&self.core_shape) {
            let core_size = core_size.min(size);
            let n_cores = size.div_ceil(core_size);
            let last_size = size - (n_cores - 1) * core_size;
            dims.push([
                core_size,
                cum_size,
                div_const(cum_size)?,
                n_cores,
                cum_cores,
                div_const(cum_cores)?,
                last_size,
                cum_last,
                div_const(cum_last)?,
            ]);
            cum_size = checked_product(cum_size, core_size, "core size", self.id)?;
            cum_cores = checked_product(cum_cores, n_cores, "core count", self.id)?;
            cum_last = checked_product(cum_last, last_size, "last core size", self.id)?;
        }
        Ok(dims)
    }
}

fn checked_product(acc: u32, factor: u32, what: &str, source: u32) -> ConnectivityResult<u32> {
    acc.checked_mul(factor).ok_or_else(|| {
        ConnectivityError::InvalidParameter(format!(
            "cumulative {} of source {} does not fit 32 bits",
            what, source
        ))
    })
}

/// One projection arriving at the core, with the vertex it comes from
#[derive(Debug, Clone, Copy)]
pub struct IncomingProjection<'a> {
    pub source: &'a SourceVertex,
    pub projection: &'a Projection,
}

/// Encoded regions for one receiving core
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalOnlyRegions {
    pub params: Vec<u8>,
    pub weights: Vec<i16>,
}

impl LocalOnlyRegions {
    /// Weight region as little-endian bytes, padded to a word
    pub fn weight_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; pad_to_word(self.weights.len() * BYTES_PER_SHORT)];
        LittleEndian::write_i16_into(
            &self.weights,
            &mut bytes[..self.weights.len() * BYTES_PER_SHORT],
        );
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalOnlyEncoder {
    max_local_delay: u32,
}

impl LocalOnlyEncoder {
    /// `max_local_delay` is the longest delay, in time steps, a core holds itself
    pub fn new(max_local_delay: u32) -> ConnectivityResult<Self> {
        if max_local_delay == 0 || max_local_delay > u32::from(u16::MAX) {
            return Err(ConnectivityError::InvalidParameter(format!(
                "maximum local delay {} must be between 1 and {}",
                max_local_delay,
                u16::MAX
            )));
        }
        Ok(Self { max_local_delay })
    }

    pub fn max_local_delay(&self) -> u32 {
        self.max_local_delay
    }

    /// (delay stage, local delay) for a delay in time steps
    pub fn split_delay(&self, delay: u32) -> (u32, u32) {
        if delay <= self.max_local_delay {
            return (0, delay);
        }
        let stage = delay.div_ceil(self.max_local_delay) - 1;
        (stage, delay - stage * self.max_local_delay)
    }

    fn delay_fields(&self, projection: &Projection) -> ConnectivityResult<(u16, u16)> {
        let request = projection.request();
        let delay_ms = request.delays().fixed_value().ok_or_else(|| {
            ConnectivityError::InvalidParameter(format!(
                "projection {} needs a fixed delay on a local-only core",
                request.id()
            ))
        })?;
        let (stage, local) = self.split_delay(request.delay_steps(delay_ms));
        let stage = u16::try_from(stage).map_err(|_| {
            ConnectivityError::InvalidParameter(format!(
                "delay stage {} of projection {} does not fit 16 bits",
                stage,
                request.id()
            ))
        })?;
        // local <= max_local_delay, which fits 16 bits
        Ok((stage, local as u16))
    }

    /// Parameter region size for a core receiving `incoming`
    pub fn params_size(
        &self,
        post_slice: &VertexSlice,
        incoming: &[IncomingProjection<'_>],
        weight_scales: &WeightScales,
    ) -> ConnectivityResult<usize> {
        check_encodings(incoming)?;
        let mut n_bytes = HEADER_WORDS * BYTES_PER_WORD;
        for (source, projections) in group_by_source(incoming) {
            n_bytes += (SOURCE_WORDS + DIMENSION_WORDS * source.shape.len()) * BYTES_PER_WORD;
            for projection in projections {
                let target = DeviceTarget {
                    post_slice,
                    weight_scales,
                    delay_stage: 0,
                    local_delay: 0,
                    weight_index: 0,
                };
                n_bytes += projection
                    .connector()
                    .device_params_size(projection.request(), &target);
            }
        }
        Ok(n_bytes)
    }

    pub fn encode(
        &self,
        post_slice: &VertexSlice,
        incoming: &[IncomingProjection<'_>],
        weight_scales: &WeightScales,
    ) -> ConnectivityResult<LocalOnlyRegions> {
        let size = self.params_size(post_slice, incoming, weight_scales)?;
        let groups = group_by_source(incoming);
        let mut writer = RegionWriter::with_size(size);

        writer.write_words(&[post_slice.n_atoms(), groups.len() as u32, incoming.len() as u32])?;

        let mut first_connector = 0usize;
        for (source, projections) in &groups {
            source.check()?;
            if first_connector > MAX_FIRST_CONNECTOR || projections.len() > usize::from(u16::MAX) {
                return Err(ConnectivityError::InvalidParameter(format!(
                    "too many connectors for source {}",
                    source.id
                )));
            }
            let routing = &source.routing;
            writer.write_words(&[
                routing.key_and_mask.key,
                routing.key_and_mask.mask,
                ((projections.len() as u32) << 16)
                    | (u32::from(routing.n_colour_bits) << 13)
                    | first_connector as u32,
                (routing.mask_shift << 16) | routing.core_mask,
                source.shape.len() as u32,
            ])?;
            for dim in source.dimension_words()?.iter().rev() {
                writer.write_words(dim)?;
            }
            first_connector += projections.len();
        }

        let mut weights: Vec<i16> = Vec::new();
        let mut kernel_offsets: AHashMap<u32, u16> = AHashMap::new();
        for (source, projections) in &groups {
            for projection in projections {
                let request = projection.request();
                let connector = projection.connector();
                let (delay_stage, local_delay) = self.delay_fields(projection)?;

                let weight_index = match kernel_offsets.get(&request.id()) {
                    Some(&offset) => offset,
                    None => {
                        let kernel = connector.device_weights(request, weight_scales)?;
                        let offset = u16::try_from(weights.len()).map_err(|_| {
                            ConnectivityError::InvalidParameter(format!(
                                "weight offset {} of projection {} does not fit 16 bits",
                                weights.len(),
                                request.id()
                            ))
                        })?;
                        weights.extend(kernel);
                        kernel_offsets.insert(request.id(), offset);
                        offset
                    }
                };

                let target = DeviceTarget {
                    post_slice,
                    weight_scales,
                    delay_stage,
                    local_delay,
                    weight_index,
                };
                let expected = connector.device_params_size(request, &target);
                let start = writer.position();
                connector.write_device_params(request, &target, &mut writer)?;
                let written = writer.position() - start;
                if written != expected {
                    return Err(ConnectivityError::RegionSizeMismatch {
                        expected,
                        actual: written,
                    });
                }
                debug!(
                    target: "synforge-connectivity",
                    "{} block for projection {} from source {}: {} bytes, delay stage {} local {}",
                    connector.name(),
                    request.id(),
                    source.id,
                    written,
                    delay_stage,
                    local_delay
                );
            }
        }

        let params = writer.finish()?;
        info!(
            target: "synforge-connectivity",
            "Local-only regions for atoms {}..={}: {} sources, {} connectors, {} parameter bytes, {} weights",
            post_slice.lo_atom,
            post_slice.hi_atom,
            groups.len(),
            incoming.len(),
            params.len(),
            weights.len()
        );
        Ok(LocalOnlyRegions { params, weights })
    }
}

/// Every connector must be local-only, and all of one kind
fn check_encodings(incoming: &[IncomingProjection<'_>]) -> ConnectivityResult<()> {
    let mut kind = None;
    for item in incoming {
        let connector = item.projection.connector();
        let id = connector.device_encoding_id();
        if !id.is_local_only() {
            return Err(ConnectivityError::InvalidParameter(format!(
                "{} cannot be encoded for a local-only core",
                connector.name()
            )));
        }
        match kind {
            None => kind = Some(id),
            Some(existing) if existing != id => {
                return Err(ConnectivityError::InvalidParameter(format!(
                    "a local-only core cannot mix {:?} and {:?} connectors",
                    existing, id
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Projections grouped by source vertex, sources in first-seen order
fn group_by_source<'a>(
    incoming: &[IncomingProjection<'a>],
) -> Vec<(&'a SourceVertex, Vec<&'a Projection>)> {
    let mut groups: Vec<(&'a SourceVertex, Vec<&'a Projection>)> = Vec::new();
    for item in incoming {
        match groups.iter_mut().find(|(source, _)| source.id == item.source.id) {
            Some((_, projections)) => projections.push(item.projection),
            None => groups.push((item.source, vec![item.projection])),
        }
    }
    groups
}
