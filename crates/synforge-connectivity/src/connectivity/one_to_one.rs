// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Pre atom `i` connects to post atom `i`.
*/

use crate::bounds::{BoundEstimator, DelayWindow};
use crate::connectivity::Connector;
use crate::device::{DeviceEncodingId, DeviceTarget, RegionWriter};
use crate::population::VertexSlice;
use crate::request::ConnectionRequest;
use crate::rng::BuildContext;
use crate::synaptic_block::{SynapticBlock, SynapticRecord};
use crate::types::ConnectivityResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneToOneConnector;

impl Connector for OneToOneConnector {
    fn name(&self) -> &'static str {
        "OneToOneConnector"
    }

    fn validate(&self, _request: &ConnectionRequest) -> ConnectivityResult<()> {
        Ok(())
    }

    fn max_connections_from_one_source(
        &self,
        _n_post_atoms: u32,
        request: &ConnectionRequest,
        bounds: &BoundEstimator,
        delay_window: Option<DelayWindow>,
    ) -> u64 {
        bounds.restrict_to_delay_window(request.n_pairs(), 1, request.delays(), delay_window)
    }

    fn max_connections_to_one_target(
        &self,
        _request: &ConnectionRequest,
        _bounds: &BoundEstimator,
    ) -> u64 {
        1
    }

    fn enumerate(
        &mut self,
        post_slice: &VertexSlice,
        request: &ConnectionRequest,
        ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock> {
        let mut rng = ctx.rng_for(request.context_key().for_post_slice(post_slice));
        let records = post_slice
            .raster_atoms(&request.post().shape)
            .into_iter()
            .filter(|&target| target < request.n_pre())
            .map(|target| SynapticRecord::draw(&mut rng, request, target, target))
            .collect();
        Ok(SynapticBlock::from_records(records))
    }

    fn device_encoding_id(&self) -> DeviceEncodingId {
        DeviceEncodingId::OneToOne
    }

    fn device_params_size(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
    ) -> usize {
        0
    }

    fn write_device_params(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
        _writer: &mut RegionWriter,
    ) -> ConnectivityResult<()> {
        Ok(())
    }

    fn invalidate(&mut self) {}
}
