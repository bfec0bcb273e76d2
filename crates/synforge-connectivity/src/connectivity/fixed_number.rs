// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Fixed fan-out / fan-in connectivity.

With [`Side::Post`] each pre atom draws `n` post partners; with [`Side::Pre`]
each post atom draws `n` pre partners. The whole selection table for a
request is drawn once, cached, and shared by every slice query until the
connector is invalidated.
*/

use rand::seq::index;
use rand::Rng;
use tracing::{debug, warn};

use crate::bounds::{BoundEstimator, DelayWindow};
use crate::cache::ConnectorCache;
use crate::connectivity::Connector;
use crate::device::{DeviceEncodingId, DeviceTarget, RegionWriter, SeedCache};
use crate::diagnostics::SelectionDump;
use crate::population::VertexSlice;
use crate::request::ConnectionRequest;
use crate::rng::BuildContext;
use crate::synaptic_block::{SynapticBlock, SynapticRecord};
use crate::types::{ConnectivityError, ConnectivityResult};

/// Which side of the projection draws its partners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Each pre atom picks `n` post atoms (fixed fan-out)
    Post,
    /// Each post atom picks `n` pre atoms (fixed fan-in)
    Pre,
}

/// Draw `n` partner indices from `0..pool_size`.
///
/// `own_index` is left out of the pool when given. Without replacement the
/// indices are distinct; the caller guarantees `n` fits the eligible pool.
pub fn draw_partners<R: Rng + ?Sized>(
    rng: &mut R,
    pool_size: u32,
    own_index: Option<u32>,
    n: u32,
    with_replacement: bool,
) -> Vec<u32> {
    let excluded = own_index.filter(|&own| own < pool_size);
    let eligible = pool_size - u32::from(excluded.is_some());
    if n == 0 || eligible == 0 {
        return Vec::new();
    }
    let shift = |index: u32| match excluded {
        Some(own) if index >= own => index + 1,
        _ => index,
    };

    let mut chosen: Vec<u32> = if with_replacement {
        (0..n).map(|_| shift(rng.gen_range(0..eligible))).collect()
    } else {
        index::sample(rng, eligible as usize, n.min(eligible) as usize)
            .into_iter()
            .map(|i| shift(i as u32))
            .collect()
    };
    chosen.sort_unstable();
    chosen
}

/// Stem of the selection dump, e.g. `retina_to_v1_fixednumberpost-conn`
fn dump_name(side: Side, request: &ConnectionRequest) -> String {
    let side = match side {
        Side::Post => "post",
        Side::Pre => "pre",
    };
    format!(
        "{}_to_{}_fixednumber{}-conn",
        request.pre().label,
        request.post().label,
        side
    )
}

#[derive(Debug, Clone)]
pub struct FixedNumberConnector {
    side: Side,
    n: u32,
    allow_self_connections: bool,
    with_replacement: bool,
    verbose: bool,
    selections: ConnectorCache<Vec<Vec<u32>>>,
    seeds: SeedCache,
}

impl FixedNumberConnector {
    /// Each pre atom connects to `n` post atoms
    pub fn post(n: u32) -> Self {
        Self::new(Side::Post, n)
    }

    /// Each post atom receives from `n` pre atoms
    pub fn pre(n: u32) -> Self {
        Self::new(Side::Pre, n)
    }

    fn new(side: Side, n: u32) -> Self {
        Self {
            side,
            n,
            allow_self_connections: true,
            with_replacement: false,
            verbose: false,
            selections: ConnectorCache::new(),
            seeds: SeedCache::default(),
        }
    }

    pub fn with_self_connections(mut self, allow: bool) -> Self {
        self.allow_self_connections = allow;
        self
    }

    pub fn with_replacement(mut self, with_replacement: bool) -> Self {
        self.with_replacement = with_replacement;
        self
    }

    /// Dump the selection table to the build's diagnostic sink when drawn
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    /// (choosers, pool size) for this side
    fn dimensions(&self, request: &ConnectionRequest) -> (u32, u32) {
        match self.side {
            Side::Post => (request.n_pre(), request.n_post()),
            Side::Pre => (request.n_post(), request.n_pre()),
        }
    }

    fn excludes_self(&self, request: &ConnectionRequest) -> bool {
        request.is_recurrent() && !self.allow_self_connections
    }

    fn eligible_pool(&self, request: &ConnectionRequest) -> u32 {
        let (_, pool) = self.dimensions(request);
        pool - u32::from(self.excludes_self(request))
    }

    /// Selection table for the request, drawn on first use
    pub fn selections(
        &mut self,
        request: &ConnectionRequest,
        ctx: &mut BuildContext,
    ) -> ConnectivityResult<&[Vec<u32>]> {
        let key = request.context_key();
        let freshly_drawn = !self.selections.contains(key);
        let (n_choosers, pool) = self.dimensions(request);
        let exclude_self = self.excludes_self(request);
        let (n, with_replacement) = (self.n, self.with_replacement);
        let source = ctx.rng_source();

        let table = self.selections.get_or_insert_with(key, || {
            (0..n_choosers)
                .map(|chooser| {
                    let mut rng = source.rng_for(key.child(u64::from(chooser)));
                    let own = exclude_self.then_some(chooser);
                    draw_partners(&mut rng, pool, own, n, with_replacement)
                })
                .collect()
        });

        if freshly_drawn {
            debug!(
                target: "synforge-connectivity",
                "Drew {} partner rows of {} for request {}",
                table.len(),
                n,
                request.id()
            );
            if self.verbose {
                if let Some(sink) = ctx.diagnostics_mut() {
                    let dump = SelectionDump {
                        n_pre: request.n_pre(),
                        n_post: request.n_post(),
                        n_selected: n,
                        rows: table.clone(),
                    };
                    let name = dump_name(self.side, request);
                    if let Err(e) = sink.write_selection(&name, &dump) {
                        warn!(
                            target: "synforge-connectivity",
                            "Failed to write selection dump {}: {}",
                            name,
                            e
                        );
                    }
                }
            }
        }
        Ok(table.as_slice())
    }
}

impl Connector for FixedNumberConnector {
    fn name(&self) -> &'static str {
        match self.side {
            Side::Post => "FixedNumberPostConnector",
            Side::Pre => "FixedNumberPreConnector",
        }
    }

    fn validate(&self, request: &ConnectionRequest) -> ConnectivityResult<()> {
        let (_, pool) = self.dimensions(request);
        let eligible = self.eligible_pool(request);
        if self.with_replacement {
            if self.n > 0 && eligible == 0 {
                return Err(ConnectivityError::InvalidSamplingRequest(format!(
                    "{}: no eligible partners to draw {} from",
                    self.name(),
                    self.n
                )));
            }
            return Ok(());
        }
        if self.n > pool {
            return Err(ConnectivityError::InvalidSamplingRequest(format!(
                "{}: requested count {} exceeds population size {} without replacement",
                self.name(),
                self.n,
                pool
            )));
        }
        if self.n > eligible {
            return Err(ConnectivityError::InvalidSamplingRequest(format!(
                "{}: requested count {} equals the population size but self-connections \
                 are excluded, leaving {} partners",
                self.name(),
                self.n,
                eligible
            )));
        }
        Ok(())
    }

    fn max_connections_from_one_source(
        &self,
        n_post_atoms: u32,
        request: &ConnectionRequest,
        bounds: &BoundEstimator,
        delay_window: Option<DelayWindow>,
    ) -> u64 {
        let n_post_atoms = n_post_atoms.min(request.n_post());
        let n = u64::from(self.n);
        let n_connections = match self.side {
            Side::Post => {
                if n_post_atoms >= request.n_post() {
                    n
                } else {
                    let p = f64::from(n_post_atoms) / f64::from(request.n_post());
                    let selected = bounds.probable_maximum_selected(request.n_pairs(), n, p);
                    // Repeated draws can hit one target many times
                    if self.with_replacement {
                        selected
                    } else {
                        selected.min(u64::from(n_post_atoms))
                    }
                }
            }
            Side::Pre => {
                let eligible = self.eligible_pool(request);
                if eligible == 0 {
                    0
                } else if self.with_replacement {
                    bounds.probable_maximum_selected(
                        request.n_pairs(),
                        u64::from(n_post_atoms) * n,
                        1.0 / f64::from(eligible),
                    )
                } else {
                    bounds.probable_maximum_selected(
                        request.n_pairs(),
                        u64::from(n_post_atoms),
                        f64::from(self.n) / f64::from(eligible),
                    )
                }
            }
        };
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
        match self.side {
            Side::Pre => u64::from(self.n),
            Side::Post => {
                let eligible = self.eligible_pool(request);
                if eligible == 0 {
                    0
                } else if self.with_replacement {
                    bounds.probable_maximum_selected(
                        request.n_pairs(),
                        u64::from(request.n_pre()) * u64::from(self.n),
                        1.0 / f64::from(eligible),
                    )
                } else {
                    bounds.probable_maximum_selected(
                        request.n_pairs(),
                        u64::from(request.n_pre()),
                        f64::from(self.n) / f64::from(eligible),
                    )
                }
            }
        }
    }

    fn enumerate(
        &mut self,
        post_slice: &VertexSlice,
        request: &ConnectionRequest,
        ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock> {
        let mut rng = ctx.rng_for(request.context_key().for_post_slice(post_slice).child(1));
        let side = self.side;
        let table = self.selections(request, ctx)?;
        let post_shape = &request.post().shape;

        let mut records = Vec::new();
        match side {
            Side::Post => {
                for (pre, row) in table.iter().enumerate() {
                    for &post in row {
                        if post_slice.contains_raster(post, post_shape) {
                            records.push(SynapticRecord::draw(&mut rng, request, pre as u32, post));
                        }
                    }
                }
            }
            Side::Pre => {
                for post in post_slice.raster_atoms(post_shape) {
                    for &pre in &table[post as usize] {
                        records.push(SynapticRecord::draw(&mut rng, request, pre, post));
                    }
                }
            }
        }
        Ok(SynapticBlock::from_records(records))
    }

    fn device_encoding_id(&self) -> DeviceEncodingId {
        match self.side {
            Side::Post => DeviceEncodingId::FixedNumberPost,
            Side::Pre => DeviceEncodingId::FixedNumberPre,
        }
    }

    fn device_params_size(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
    ) -> usize {
        3 * 4
    }

    fn write_device_params(
        &self,
        request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
        writer: &mut RegionWriter,
    ) -> ConnectivityResult<()> {
        let allow_self = self.allow_self_connections || !request.is_recurrent();
        writer.write_words(&[
            u32::from(allow_self),
            u32::from(self.with_replacement),
            self.n,
        ])
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
        self.selections.invalidate();
        self.seeds.invalidate();
    }
}
