// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
A configured build: bounds, seed, diagnostics and device limits taken from one
[`SynforgeConfig`] and applied to everything built through the session.
*/

use std::sync::Arc;

use synforge_config::{validate_config, SynforgeConfig};
use synforge_connectivity::request::ConnectionRequestBuilder;
use synforge_connectivity::{
    BoundEstimator, BuildContext, ConnectionRequest, ConvolutionConnector, CsvDirectorySink,
    IncomingProjection, KernelSpec, LocalOnlyEncoder, LocalOnlyRegions, Population, Projection,
    SourceRouting, SynapticBlock, SynapticBlockBuilder, VertexSlice, WeightScales,
};
use tracing::info;

use crate::SynforgeResult;

#[derive(Debug)]
pub struct BuildSession {
    config: SynforgeConfig,
    bounds: BoundEstimator,
    local_only: LocalOnlyEncoder,
    context: BuildContext,
}

impl BuildSession {
    /// Validates `config` and sets up the build state it describes.
    /// A seed of 0 draws a fresh one; [`BuildSession::seed`] reports it.
    pub fn from_config(config: &SynforgeConfig) -> SynforgeResult<Self> {
        validate_config(config)?;

        let bounds = BoundEstimator::new(
            config.bounds.failure_chance,
            config.bounds.exact_trial_limit,
        )?;
        let local_only = LocalOnlyEncoder::new(config.device.max_local_delay_steps)?;

        let mut context = match config.build.seed {
            0 => BuildContext::from_entropy(),
            seed => BuildContext::new(seed),
        };
        if config.diagnostics.enabled {
            context = context.with_diagnostics(Box::new(CsvDirectorySink::new(
                config.diagnostics.output_dir.clone(),
            )));
        }

        info!(
            target: "synforge",
            "Build session seed {} (failure chance {}, max local delay {})",
            context.seed(),
            config.bounds.failure_chance,
            config.device.max_local_delay_steps
        );
        Ok(Self {
            config: config.clone(),
            bounds,
            local_only,
            context,
        })
    }

    pub fn config(&self) -> &SynforgeConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.context.seed()
    }

    pub fn bounds(&self) -> &BoundEstimator {
        &self.bounds
    }

    pub fn local_only(&self) -> &LocalOnlyEncoder {
        &self.local_only
    }

    pub fn context_mut(&mut self) -> &mut BuildContext {
        &mut self.context
    }

    /// Request builder with the configured time step
    pub fn request(
        &self,
        id: u32,
        pre: Arc<Population>,
        post: Arc<Population>,
    ) -> ConnectionRequestBuilder {
        ConnectionRequest::builder(id, pre, post).time_step_ms(self.config.timing.time_step_ms)
    }

    /// Convolution connector honouring `build.filter_edges`
    pub fn convolution(&self, kernel: KernelSpec) -> ConvolutionConnector {
        ConvolutionConnector::new(kernel).with_filter_edges(self.config.build.filter_edges)
    }

    /// Synapse list for one post slice
    pub fn build_block(
        &mut self,
        projection: &mut Projection,
        post_slice: &VertexSlice,
    ) -> SynforgeResult<SynapticBlock> {
        let block = SynapticBlockBuilder::new(&self.bounds).build(
            projection,
            post_slice,
            &mut self.context,
        )?;
        Ok(block)
    }

    /// Routing for a population split over `n_cores` cores of the configured size
    pub fn source_routing(&self, base_key: u32, n_cores: u32) -> SynforgeResult<SourceRouting> {
        let routing = SourceRouting::for_cores(
            base_key,
            n_cores,
            self.config.device.max_atoms_per_core,
            self.config.device.n_colour_bits,
        )?;
        Ok(routing)
    }

    /// Parameter and weight regions of a local-only core
    pub fn encode_local_only(
        &self,
        post_slice: &VertexSlice,
        incoming: &[IncomingProjection<'_>],
        weight_scales: &WeightScales,
    ) -> SynforgeResult<LocalOnlyRegions> {
        let regions = self.local_only.encode(post_slice, incoming, weight_scales)?;
        Ok(regions)
    }
}
