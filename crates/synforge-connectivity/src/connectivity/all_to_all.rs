// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Every pre atom connects to every post atom.
*/

use crate::bounds::{BoundEstimator, DelayWindow};
use crate::connectivity::Connector;
use crate::device::{DeviceEncodingId, DeviceTarget, RegionWriter};
use crate::population::VertexSlice;
use crate::request::ConnectionRequest;
use crate::rng::BuildContext;
use crate::synaptic_block::{SynapticBlock, SynapticRecord};
use crate::types::ConnectivityResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllToAllConnector {
    allow_self_connections: bool,
}

impl AllToAllConnector {
    pub fn new(allow_self_connections: bool) -> Self {
        Self {
            allow_self_connections,
        }
    }

    pub fn allow_self_connections(&self) -> bool {
        self.allow_self_connections
    }
}

impl Default for AllToAllConnector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connector for AllToAllConnector {
    fn name(&self) -> &'static str {
        "AllToAllConnector"
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
        let n_connections = u64::from(n_post_atoms.min(request.n_post()));
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
        _bounds: &BoundEstimator,
    ) -> u64 {
        u64::from(request.n_pre())
    }

    fn enumerate(
        &mut self,
        post_slice: &VertexSlice,
        request: &ConnectionRequest,
        ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock> {
        let mut rng = ctx.rng_for(request.context_key().for_post_slice(post_slice));
        let targets = post_slice.raster_atoms(&request.post().shape);
        let skip_self = request.is_recurrent() && !self.allow_self_connections;

        let mut records = Vec::with_capacity(request.n_pre() as usize * targets.len());
        for source in 0..request.n_pre() {
            for &target in &targets {
                if skip_self && source == target {
                    continue;
                }
                records.push(SynapticRecord::draw(&mut rng, request, source, target));
            }
        }
        Ok(SynapticBlock::from_records(records))
    }

    fn device_encoding_id(&self) -> DeviceEncodingId {
        DeviceEncodingId::AllToAll
    }

    fn device_params_size(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
    ) -> usize {
        4
    }

    fn write_device_params(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
        writer: &mut RegionWriter,
    ) -> ConnectivityResult<()> {
        writer.write_u32(u32::from(self.allow_self_connections))
    }

    fn invalidate(&mut self) {}
}
