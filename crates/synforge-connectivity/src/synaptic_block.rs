// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Host-side materialization of connections.

[`SynapticBlockBuilder`] asks a projection's connector for the explicit
connections landing on one post slice and checks the result against the
connector's own fan-in/fan-out bounds.
*/

use ahash::AHashMap;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bounds::BoundEstimator;
use crate::population::VertexSlice;
use crate::request::{ConnectionRequest, Projection};
use crate::rng::BuildContext;
use crate::types::{ConnectivityError, ConnectivityResult, FixedPoint};

/// One point-to-point connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SynapticRecord {
    /// Raster index in the pre population
    pub source: u32,
    /// Raster index in the post population
    pub target: u32,
    pub weight: FixedPoint,
    /// Delay in time steps (at least 1)
    pub delay: u32,
    pub synapse_type: u8,
}

impl SynapticRecord {
    /// Record with weight and delay drawn from the request's descriptors
    pub fn draw<R: Rng + ?Sized>(
        rng: &mut R,
        request: &ConnectionRequest,
        source: u32,
        target: u32,
    ) -> Self {
        let weight = request.weights().sample(rng);
        let delay = request.delay_steps(request.delays().sample(rng));
        Self {
            source,
            target,
            weight: FixedPoint::from_f64(weight),
            delay,
            synapse_type: request.synapse_type(),
        }
    }
}

/// Ordered list of connections, sorted stably by (source, target)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SynapticBlock {
    records: Vec<SynapticRecord>,
}

impl SynapticBlock {
    pub fn from_records(mut records: Vec<SynapticRecord>) -> Self {
        records.sort_by_key(|r| (r.source, r.target));
        Self { records }
    }

    pub fn records(&self) -> &[SynapticRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SynapticRecord> {
        self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &SynapticRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Largest number of records sharing a source
    pub fn max_fan_out(&self) -> u64 {
        max_count(self.records.iter().map(|r| r.source))
    }

    /// Largest number of records sharing a target
    pub fn max_fan_in(&self) -> u64 {
        max_count(self.records.iter().map(|r| r.target))
    }
}

fn max_count(keys: impl Iterator<Item = u32>) -> u64 {
    let mut counts: AHashMap<u32, u64> = AHashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts.values().copied().max().unwrap_or(0)
}

/// Builds explicit connection lists for projections
#[derive(Debug, Clone, Copy)]
pub struct SynapticBlockBuilder<'a> {
    bounds: &'a BoundEstimator,
}

impl<'a> SynapticBlockBuilder<'a> {
    pub fn new(bounds: &'a BoundEstimator) -> Self {
        Self { bounds }
    }

    pub fn build(
        &self,
        projection: &mut Projection,
        post_slice: &VertexSlice,
        ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock> {
        let (request, connector) = projection.parts_mut();
        if post_slice.hi_atom >= request.n_post() {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "post slice {}..={} exceeds population '{}' of {} atoms",
                post_slice.lo_atom,
                post_slice.hi_atom,
                request.post().label,
                request.n_post()
            )));
        }

        let block = connector.enumerate(post_slice, request, ctx)?;

        let fan_out_bound = connector.max_connections_from_one_source(
            post_slice.n_atoms(),
            request,
            self.bounds,
            None,
        );
        let fan_in_bound = connector.max_connections_to_one_target(request, self.bounds);
        let fan_out = block.max_fan_out();
        let fan_in = block.max_fan_in();
        if fan_out > fan_out_bound || fan_in > fan_in_bound {
            warn!(
                target: "synforge-connectivity",
                "{} {} -> {}: observed fan-out {} / fan-in {} above bounds {} / {}",
                connector.name(),
                request.pre().label,
                request.post().label,
                fan_out,
                fan_in,
                fan_out_bound,
                fan_in_bound
            );
        }

        debug!(
            target: "synforge-connectivity",
            "{} slice {}..={}: max fan-out {} (bound {}), max fan-in {} (bound {})",
            connector.name(),
            post_slice.lo_atom,
            post_slice.hi_atom,
            fan_out,
            fan_out_bound,
            fan_in,
            fan_in_bound
        );
        info!(
            target: "synforge-connectivity",
            "Built {} synapses for {} -> {} ({})",
            block.len(),
            request.pre().label,
            request.post().label,
            connector.name()
        );
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: u32, target: u32) -> SynapticRecord {
        SynapticRecord {
            source,
            target,
            weight: FixedPoint::from_f64(1.0),
            delay: 1,
            synapse_type: 0,
        }
    }

    #[test]
    fn test_block_is_sorted_and_counted() {
        let block = SynapticBlock::from_records(vec![
            record(2, 0),
            record(0, 1),
            record(0, 0),
            record(1, 0),
        ]);
        let order: Vec<(u32, u32)> = block.iter().map(|r| (r.source, r.target)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (2, 0)]);
        assert_eq!(block.max_fan_out(), 2);
        assert_eq!(block.max_fan_in(), 3);
    }

    #[test]
    fn test_empty_block_stats() {
        let block = SynapticBlock::default();
        assert!(block.is_empty());
        assert_eq!(block.max_fan_out(), 0);
        assert_eq!(block.max_fan_in(), 0);
    }
}
