// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Each (pre, post) pair connects independently with probability `p`.

Rows are drawn per pre atom from their own derived RNG, so the result is the
same whether or not rows are generated in parallel.
*/

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use rand::Rng;

use crate::bounds::{BoundEstimator, DelayWindow};
use crate::cache::ContextKey;
use crate::connectivity::Connector;
use crate::device::{DeviceEncodingId, DeviceTarget, RegionWriter, SeedCache};
use crate::population::VertexSlice;
use crate::request::ConnectionRequest;
use crate::rng::{BuildContext, RngSource};
use crate::synaptic_block::{SynapticBlock, SynapticRecord};
use crate::types::{ConnectivityError, ConnectivityResult};

#[derive(Debug, Clone)]
pub struct FixedProbabilityConnector {
    p_connect: f64,
    allow_self_connections: bool,
    seeds: SeedCache,
}

impl FixedProbabilityConnector {
    pub fn new(p_connect: f64, allow_self_connections: bool) -> ConnectivityResult<Self> {
        if !(0.0..=1.0).contains(&p_connect) {
            return Err(ConnectivityError::InvalidParameter(format!(
                "connection probability {} must be between 0 and 1",
                p_connect
            )));
        }
        Ok(Self {
            p_connect,
            allow_self_connections,
            seeds: SeedCache::default(),
        })
    }

    pub fn p_connect(&self) -> f64 {
        self.p_connect
    }

    /// Probability as an unsigned 0.32 fixed-point word
    pub fn encoded_probability(&self) -> u32 {
        let scaled = (self.p_connect * 4_294_967_296.0).round();
        if scaled >= u32::MAX as f64 {
            u32::MAX
        } else {
            scaled as u32
        }
    }

    fn draw_row(
        &self,
        source: RngSource,
        slice_key: ContextKey,
        request: &ConnectionRequest,
        pre: u32,
        targets: &[u32],
    ) -> Vec<SynapticRecord> {
        let mut rng = source.rng_for(slice_key.child(u64::from(pre)));
        let skip_self = request.is_recurrent() && !self.allow_self_connections;
        let mut row = Vec::new();
        for &target in targets {
            let hit = rng.gen::<f64>() < self.p_connect;
            if hit && !(skip_self && pre == target) {
                row.push(SynapticRecord::draw(&mut rng, request, pre, target));
            }
        }
        row
    }
}

impl Connector for FixedProbabilityConnector {
    fn name(&self) -> &'static str {
        "FixedProbabilityConnector"
    }

    fn validate(&self, _request: &ConnectionRequest) -> ConnectivityResult<()> {
        Ok(())
    }

    fn max_connections_from_one_source(
        &self,
        n_post_atoms: u32,
        request: &ConnectionRequest,
        bounds: &BoundEstimator,
        delay_window: Option<DelayWindow>,
    ) -> u64 {
        let n_post_atoms = u64::from(n_post_atoms.min(request.n_post()));
        let n_connections =
            bounds.probable_maximum_selected(request.n_pairs(), n_post_atoms, self.p_connect);
        bounds.restrict_to_delay_window(
            request.n_pairs(),
            n_connections,
            request.delays(),
            delay_window,
        )
    }

    fn max_connections_to_one_target(
        &self,
        request: &ConnectionRequest,
        bounds: &BoundEstimator,
    ) -> u64 {
        bounds.probable_maximum_selected(
            request.n_pairs(),
            u64::from(request.n_pre()),
            self.p_connect,
        )
    }

    fn enumerate(
        &mut self,
        post_slice: &VertexSlice,
        request: &ConnectionRequest,
        ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock> {
        let source = ctx.rng_source();
        let slice_key = request.context_key().for_post_slice(post_slice);
        let targets = post_slice.raster_atoms(&request.post().shape);

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<SynapticRecord>> = (0..request.n_pre())
            .into_par_iter()
            .map(|pre| self.draw_row(source, slice_key, request, pre, &targets))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<SynapticRecord>> = (0..request.n_pre())
            .map(|pre| self.draw_row(source, slice_key, request, pre, &targets))
            .collect();

        Ok(SynapticBlock::from_records(rows.into_iter().flatten().collect()))
    }

    fn device_encoding_id(&self) -> DeviceEncodingId {
        DeviceEncodingId::FixedProbability
    }

    fn device_params_size(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
    ) -> usize {
        2 * 4
    }

    fn write_device_params(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
        writer: &mut RegionWriter,
    ) -> ConnectivityResult<()> {
        writer.write_u32(u32::from(self.allow_self_connections))?;
        writer.write_u32(self.encoded_probability())
    }

    fn generator_seed(
        &mut self,
        request: &ConnectionRequest,
        pre_slice: &VertexSlice,
        post_slice: &VertexSlice,
        ctx: &BuildContext,
    ) -> Option<[u32; 4]> {
        let key = request.context_key().for_slices(pre_slice, post_slice);
        Some(self.seeds.seed_for(key, ctx.rng_source()))
    }

    fn invalidate(&mut self) {
        self.seeds.invalidate();
    }
}
