// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
The shared connector contract.

Every topology implements the same fixed method set; adding a topology means
adding an implementation, never touching shared dispatch.
*/

use crate::bounds::{BoundEstimator, DelayWindow};
use crate::device::{DeviceEncodingId, DeviceTarget, RegionWriter, WeightScales};
use crate::population::VertexSlice;
use crate::request::ConnectionRequest;
use crate::rng::BuildContext;
use crate::synaptic_block::SynapticBlock;
use crate::types::ConnectivityResult;

/// Strategy deciding which source atoms connect to which target atoms
pub trait Connector: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Checked once when a projection is created; fails before any state is built
    fn validate(&self, request: &ConnectionRequest) -> ConnectivityResult<()>;

    /// Smallest and largest delay (ms) this connector can produce
    fn delay_bounds(&self, request: &ConnectionRequest) -> (f64, f64) {
        (request.delays().min(), request.delays().max())
    }

    /// Largest absolute weight this connector can produce
    fn weight_bound(&self, request: &ConnectionRequest) -> f64 {
        request.weights().max_abs()
    }

    /// Connections from one source atom into a post slice of `n_post_atoms`,
    /// counting only delays inside `delay_window` when one is given
    fn max_connections_from_one_source(
        &self,
        n_post_atoms: u32,
        request: &ConnectionRequest,
        bounds: &BoundEstimator,
        delay_window: Option<DelayWindow>,
    ) -> u64;

    /// Connections arriving at one target atom
    fn max_connections_to_one_target(
        &self,
        request: &ConnectionRequest,
        bounds: &BoundEstimator,
    ) -> u64;

    /// Explicit connections onto the atoms of `post_slice`
    fn enumerate(
        &mut self,
        post_slice: &VertexSlice,
        request: &ConnectionRequest,
        ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock>;

    /// Can any atom of `pre_tile` reach any atom of `post_tile`?
    fn could_connect(
        &self,
        _request: &ConnectionRequest,
        _pre_tile: &VertexSlice,
        _post_tile: &VertexSlice,
    ) -> bool {
        true
    }

    fn device_encoding_id(&self) -> DeviceEncodingId;

    /// Exact byte length of the block [`Connector::write_device_params`] writes
    fn device_params_size(&self, request: &ConnectionRequest, target: &DeviceTarget<'_>) -> usize;

    fn write_device_params(
        &self,
        request: &ConnectionRequest,
        target: &DeviceTarget<'_>,
        writer: &mut RegionWriter,
    ) -> ConnectivityResult<()>;

    /// Sized, complete parameter block
    fn device_params(
        &self,
        request: &ConnectionRequest,
        target: &DeviceTarget<'_>,
    ) -> ConnectivityResult<Vec<u8>> {
        let mut writer = RegionWriter::with_size(self.device_params_size(request, target));
        self.write_device_params(request, target, &mut writer)?;
        writer.finish()
    }

    /// Weights the device reads from a shared weight region (convolution kernels)
    fn device_weights(
        &self,
        _request: &ConnectionRequest,
        _weight_scales: &WeightScales,
    ) -> ConnectivityResult<Vec<i16>> {
        Ok(Vec::new())
    }

    /// Generator seed for a slice pair; `None` for deterministic connectors
    fn generator_seed(
        &mut self,
        _request: &ConnectionRequest,
        _pre_slice: &VertexSlice,
        _post_slice: &VertexSlice,
        _ctx: &BuildContext,
    ) -> Option<[u32; 4]> {
        None
    }

    /// Drop every memoized cache before a rebuild
    fn invalidate(&mut self);
}

/// Indices of the pre tiles that can reach `post_tile`
pub fn connected_pre_tiles(
    connector: &dyn Connector,
    request: &ConnectionRequest,
    pre_tiles: &[VertexSlice],
    post_tile: &VertexSlice,
) -> Vec<usize> {
    pre_tiles
        .iter()
        .enumerate()
        .filter(|(_, pre_tile)| connector.could_connect(request, pre_tile, post_tile))
        .map(|(index, _)| index)
        .collect()
}
