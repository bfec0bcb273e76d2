// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
2D convolution between grid populations.

Both populations are treated as images stored width first. Post cell
`(px, py)` receives from pooled pre cell
`(px·sx − padx + kx, py·sy − pady + ky)` for every kernel cell `(ky, kx)`;
each pooled cell covers `pool_stride` pre atoms per axis. Kernel weights are
divided by the pooling area when the kernel is built, so the host path and
the device weight region share the same values.
*/

use std::ops::RangeInclusive;

use ndarray::Array2;
use tracing::debug;

use crate::bounds::{BoundEstimator, DelayWindow};
use crate::connectivity::Connector;
use crate::device::{
    div_const, DeviceEncodingId, DeviceTarget, RegionWriter, WeightScales,
};
use crate::population::VertexSlice;
use crate::request::ConnectionRequest;
use crate::rng::BuildContext;
use crate::synaptic_block::{SynapticBlock, SynapticRecord};
use crate::types::{ConnectivityError, ConnectivityResult, Extent2, FixedPoint};

/// Bytes of one convolution parameter block: ten shorts and four words
pub const CONVOLUTION_PARAMS_BYTES: usize = 10 * 2 + 4 * 4;

/// Largest stride or pool stride the device division constants support
const MAX_DEVICE_DIVISOR: u32 = u16::MAX as u32;

/// Kernel weights plus the sampling geometry around them
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSpec {
    /// (height, width), already divided by the pooling area
    weights: Array2<f64>,
    stride: Extent2,
    padding: Extent2,
    pool_shape: Option<Extent2>,
    pool_stride: Option<Extent2>,
}

impl KernelSpec {
    pub fn new(
        weights: Array2<f64>,
        stride: Extent2,
        padding: Extent2,
    ) -> ConnectivityResult<Self> {
        let (rows, cols) = weights.dim();
        if rows == 0 || cols == 0 {
            return Err(ConnectivityError::MalformedKernelSpec(
                "kernel has no weights".to_string(),
            ));
        }
        if rows > usize::from(u16::MAX) || cols > usize::from(u16::MAX) {
            return Err(ConnectivityError::MalformedKernelSpec(format!(
                "kernel shape ({}, {}) does not fit 16 bits",
                rows, cols
            )));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
            return Err(ConnectivityError::MalformedKernelSpec(format!(
                "kernel weight {} is not finite",
                bad
            )));
        }
        check_divisor("stride", stride)?;
        if padding.height > u32::from(u16::MAX) || padding.width > u32::from(u16::MAX) {
            return Err(ConnectivityError::MalformedKernelSpec(format!(
                "padding {:?} does not fit 16 bits",
                padding
            )));
        }
        Ok(Self {
            weights,
            stride,
            padding,
            pool_shape: None,
            pool_stride: None,
        })
    }

    /// Same kernel with every weight set to `value`
    pub fn uniform(
        value: f64,
        shape: Extent2,
        stride: Extent2,
        padding: Extent2,
    ) -> ConnectivityResult<Self> {
        let weights = Array2::from_elem((shape.height as usize, shape.width as usize), value);
        Self::new(weights, stride, padding)
    }

    /// Average pooling ahead of the kernel; the pool stride defaults to the pool shape
    pub fn with_pooling(
        mut self,
        pool_shape: Extent2,
        pool_stride: Option<Extent2>,
    ) -> ConnectivityResult<Self> {
        check_divisor("pool shape", pool_shape)?;
        let pool_stride = pool_stride.unwrap_or(pool_shape);
        check_divisor("pool stride", pool_stride)?;

        let area = f64::from(pool_shape.area());
        self.weights.mapv_inplace(|w| w / area);
        self.pool_shape = Some(pool_shape);
        self.pool_stride = Some(pool_stride);
        Ok(self)
    }

    pub fn shape(&self) -> Extent2 {
        let (rows, cols) = self.weights.dim();
        Extent2::new(rows as u32, cols as u32)
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn stride(&self) -> Extent2 {
        self.stride
    }

    pub fn padding(&self) -> Extent2 {
        self.padding
    }

    pub fn pool_shape(&self) -> Option<Extent2> {
        self.pool_shape
    }

    /// Pool stride, or 1×1 without pooling
    pub fn pool_stride(&self) -> Extent2 {
        self.pool_stride.unwrap_or(Extent2::new(1, 1))
    }

    /// Pre grid after pooling
    pub fn pooled_shape(&self, pre: Extent2) -> Extent2 {
        let ps = self.pool_stride();
        Extent2::new(pre.height / ps.height, pre.width / ps.width)
    }

    /// Post grid produced from a pre grid of the given extent
    pub fn post_shape(&self, pre: Extent2) -> Extent2 {
        let pooled = self.pooled_shape(pre);
        let kernel = self.shape();
        let axis = |pooled: u32, kernel: u32, padding: u32, stride: u32| -> u32 {
            let span = i64::from(pooled) - (i64::from(kernel) - 1) + 2 * i64::from(padding);
            span.div_euclid(i64::from(stride)).max(1) as u32
        };
        Extent2::new(
            axis(pooled.height, kernel.height, self.padding.height, self.stride.height),
            axis(pooled.width, kernel.width, self.padding.width, self.stride.width),
        )
    }

    /// Pre atoms that can reach a block of post cells
    pub fn receptive_field(
        &self,
        post_x: RangeInclusive<u32>,
        post_y: RangeInclusive<u32>,
    ) -> ReceptiveField {
        let kernel = self.shape();
        let ps = self.pool_stride();
        let axis = |post: &RangeInclusive<u32>, stride: u32, padding: u32, kernel: u32, ps: u32| {
            let lo = i64::from(*post.start()) * i64::from(stride) - i64::from(padding);
            let hi = i64::from(*post.end()) * i64::from(stride) - i64::from(padding)
                + 2 * i64::from(kernel / 2);
            let ps = i64::from(ps);
            lo * ps..=hi * ps + ps - 1
        };
        ReceptiveField {
            x: axis(&post_x, self.stride.width, self.padding.width, kernel.width, ps.width),
            y: axis(&post_y, self.stride.height, self.padding.height, kernel.height, ps.height),
        }
    }
}

fn check_divisor(what: &str, extent: Extent2) -> ConnectivityResult<()> {
    let in_range = |v: u32| (1..=MAX_DEVICE_DIVISOR).contains(&v);
    if in_range(extent.height) && in_range(extent.width) {
        Ok(())
    } else {
        Err(ConnectivityError::MalformedKernelSpec(format!(
            "{} {:?} must be between 1 and {} on both axes",
            what, extent, MAX_DEVICE_DIVISOR
        )))
    }
}

/// Inclusive box of pre coordinates, possibly reaching outside the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceptiveField {
    pub x: RangeInclusive<i64>,
    pub y: RangeInclusive<i64>,
}

impl ReceptiveField {
    /// Does a 2D pre tile overlap the box on both axes?
    pub fn intersects(&self, pre_tile: &VertexSlice) -> bool {
        let overlaps = |range: std::ops::Range<u32>, field: &RangeInclusive<i64>| {
            !range.is_empty()
                && i64::from(range.start) <= *field.end()
                && i64::from(range.end - 1) >= *field.start()
        };
        overlaps(pre_tile.get_slice(0), &self.x) && overlaps(pre_tile.get_slice(1), &self.y)
    }
}

#[derive(Debug, Clone)]
pub struct ConvolutionConnector {
    kernel: KernelSpec,
    positive_receptor: String,
    negative_receptor: String,
    filter_edges: bool,
}

impl ConvolutionConnector {
    pub fn new(kernel: KernelSpec) -> Self {
        Self {
            kernel,
            positive_receptor: "excitatory".to_string(),
            negative_receptor: "inhibitory".to_string(),
            filter_edges: true,
        }
    }

    /// Receptors taking the positive and negative kernel weights
    pub fn with_receptors(mut self, positive: &str, negative: &str) -> Self {
        self.positive_receptor = positive.to_string();
        self.negative_receptor = negative.to_string();
        self
    }

    /// Without filtering every pre tile is routed to every post tile
    pub fn with_filter_edges(mut self, filter_edges: bool) -> Self {
        self.filter_edges = filter_edges;
        self
    }

    pub fn kernel(&self) -> &KernelSpec {
        &self.kernel
    }

    pub fn positive_receptor(&self) -> &str {
        &self.positive_receptor
    }

    pub fn negative_receptor(&self) -> &str {
        &self.negative_receptor
    }

    pub fn filter_edges(&self) -> bool {
        self.filter_edges
    }

    /// (positive, negative) synapse types on the post population
    pub fn synapse_types(&self, request: &ConnectionRequest) -> ConnectivityResult<(u8, u8)> {
        let post = request.post();
        Ok((
            post.require_synapse_id(&self.positive_receptor)?,
            post.require_synapse_id(&self.negative_receptor)?,
        ))
    }

    fn fixed_delay(request: &ConnectionRequest) -> ConnectivityResult<f64> {
        request.delays().fixed_value().ok_or_else(|| {
            ConnectivityError::InvalidParameter(
                "convolution connections need a single fixed delay".to_string(),
            )
        })
    }
}

impl Connector for ConvolutionConnector {
    fn name(&self) -> &'static str {
        "ConvolutionConnector"
    }

    fn validate(&self, request: &ConnectionRequest) -> ConnectivityResult<()> {
        let pre = Extent2::from_population_shape(&request.pre().shape)?;
        let post = Extent2::from_population_shape(&request.post().shape)?;

        let ps = self.kernel.pool_stride();
        if pre.height < ps.height || pre.width < ps.width {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "pre grid {:?} is smaller than one pooling step {:?}",
                pre, ps
            )));
        }

        let expected = self.kernel.post_shape(pre);
        if expected != post {
            return Err(ConnectivityError::ShapeMismatch {
                expected: expected.to_population_shape(),
                actual: request.post().shape.clone(),
            });
        }

        self.synapse_types(request)?;
        Self::fixed_delay(request)?;
        Ok(())
    }

    fn weight_bound(&self, _request: &ConnectionRequest) -> f64 {
        self.kernel.weights.iter().fold(0.0, |acc: f64, w| acc.max(w.abs()))
    }

    fn max_connections_from_one_source(
        &self,
        n_post_atoms: u32,
        request: &ConnectionRequest,
        bounds: &BoundEstimator,
        delay_window: Option<DelayWindow>,
    ) -> u64 {
        let n_connections = u64::from(self.kernel.shape().area()).min(u64::from(n_post_atoms));
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
        let per_kernel = u64::from(self.kernel.shape().area())
            * u64::from(self.kernel.pool_stride().area());
        per_kernel.min(u64::from(request.n_pre()))
    }

    fn enumerate(
        &mut self,
        post_slice: &VertexSlice,
        request: &ConnectionRequest,
        _ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock> {
        let pre = Extent2::from_population_shape(&request.pre().shape)?;
        let post = Extent2::from_population_shape(&request.post().shape)?;
        let (positive, negative) = self.synapse_types(request)?;
        let delay = request.delay_steps(Self::fixed_delay(request)?);

        let pooled = self.kernel.pooled_shape(pre);
        let ps = self.kernel.pool_stride();
        let stride = self.kernel.stride;
        let padding = self.kernel.padding;

        let mut records = Vec::new();
        for target in post_slice.raster_atoms(&request.post().shape) {
            let (px, py) = (i64::from(target % post.width), i64::from(target / post.width));
            for ((ky, kx), &weight) in self.kernel.weights.indexed_iter() {
                if weight == 0.0 {
                    continue;
                }
                let qy = py * i64::from(stride.height) - i64::from(padding.height) + ky as i64;
                let qx = px * i64::from(stride.width) - i64::from(padding.width) + kx as i64;
                if qy < 0
                    || qx < 0
                    || qy >= i64::from(pooled.height)
                    || qx >= i64::from(pooled.width)
                {
                    continue;
                }
                let synapse_type = if weight > 0.0 { positive } else { negative };
                let fixed = FixedPoint::from_f64(weight.abs());
                for dy in 0..ps.height {
                    let pre_y = qy as u32 * ps.height + dy;
                    for dx in 0..ps.width {
                        let pre_x = qx as u32 * ps.width + dx;
                        records.push(SynapticRecord {
                            source: pre_y * pre.width + pre_x,
                            target,
                            weight: fixed,
                            delay,
                            synapse_type,
                        });
                    }
                }
            }
        }
        debug!(
            target: "synforge-connectivity",
            "Convolution {} produced {} records for atoms {}..={}",
            request.id(),
            records.len(),
            post_slice.lo_atom,
            post_slice.hi_atom
        );
        Ok(SynapticBlock::from_records(records))
    }

    fn could_connect(
        &self,
        _request: &ConnectionRequest,
        pre_tile: &VertexSlice,
        post_tile: &VertexSlice,
    ) -> bool {
        if !self.filter_edges || pre_tile.shape.len() != 2 || post_tile.shape.len() != 2 {
            return true;
        }
        let (x, y) = (post_tile.get_slice(0), post_tile.get_slice(1));
        let field = self
            .kernel
            .receptive_field(x.start..=x.end - 1, y.start..=y.end - 1);
        field.intersects(pre_tile)
    }

    fn device_encoding_id(&self) -> DeviceEncodingId {
        DeviceEncodingId::LocalOnlyConvolution
    }

    fn device_params_size(
        &self,
        _request: &ConnectionRequest,
        _target: &DeviceTarget<'_>,
    ) -> usize {
        CONVOLUTION_PARAMS_BYTES
    }

    fn write_device_params(
        &self,
        request: &ConnectionRequest,
        target: &DeviceTarget<'_>,
        writer: &mut RegionWriter,
    ) -> ConnectivityResult<()> {
        let (positive, negative) = self.synapse_types(request)?;
        let kernel = self.kernel.shape();
        let padding = self.kernel.padding;
        let stride = self.kernel.stride;
        let ps = self.kernel.pool_stride();

        // Sizes were range checked when the kernel was built
        writer.write_short_pair(kernel.height as u16, kernel.width as u16)?;
        writer.write_short_pair(padding.height as u16, padding.width as u16)?;
        writer.write_short_pair(u16::from(positive), u16::from(negative))?;
        writer.write_short_pair(target.delay_stage, target.local_delay)?;
        writer.write_short_pair(target.weight_index, 0)?;
        writer.write_words(&[
            div_const(stride.height)?,
            div_const(stride.width)?,
            div_const(ps.height)?,
            div_const(ps.width)?,
        ])
    }

    fn device_weights(
        &self,
        request: &ConnectionRequest,
        weight_scales: &WeightScales,
    ) -> ConnectivityResult<Vec<i16>> {
        let (positive, negative) = self.synapse_types(request)?;
        self.kernel
            .weights
            .iter()
            .map(|&w| weight_scales.encode_signed(w, positive, negative))
            .collect()
    }

    fn invalidate(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::ParameterDescriptor;
    use crate::population::Population;
    use ndarray::array;
    use std::sync::Arc;

    fn grid(id: u32, label: &str, width: u32, height: u32) -> Arc<Population> {
        Arc::new(
            Population::new(id, label, vec![width, height], &["excitatory", "inhibitory"]).unwrap(),
        )
    }

    fn request(pre: Arc<Population>, post: Arc<Population>) -> ConnectionRequest {
        ConnectionRequest::builder(0, pre, post)
            .receptor("excitatory")
            .delays(ParameterDescriptor::Fixed(1.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_post_shape_examples() {
        let same = KernelSpec::uniform(1.0, Extent2::new(5, 5), Extent2::new(1, 1), Extent2::new(2, 2))
            .unwrap();
        assert_eq!(same.post_shape(Extent2::new(10, 10)), Extent2::new(10, 10));

        let strided =
            KernelSpec::uniform(1.0, Extent2::new(3, 3), Extent2::new(2, 2), Extent2::new(0, 0))
                .unwrap();
        assert_eq!(strided.post_shape(Extent2::new(8, 8)), Extent2::new(3, 3));
    }

    #[test]
    fn test_post_shape_clamps_to_one() {
        let kernel =
            KernelSpec::uniform(1.0, Extent2::new(7, 7), Extent2::new(1, 1), Extent2::new(0, 0))
                .unwrap();
        assert_eq!(kernel.post_shape(Extent2::new(3, 3)), Extent2::new(1, 1));
    }

    #[test]
    fn test_malformed_kernels() {
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            KernelSpec::new(empty, Extent2::new(1, 1), Extent2::new(0, 0)),
            Err(ConnectivityError::MalformedKernelSpec(_))
        ));
        assert!(KernelSpec::new(array![[f64::NAN]], Extent2::new(1, 1), Extent2::new(0, 0)).is_err());
        assert!(KernelSpec::new(array![[1.0]], Extent2::new(0, 1), Extent2::new(0, 0)).is_err());
        let kernel = KernelSpec::new(array![[1.0]], Extent2::new(1, 1), Extent2::new(0, 0)).unwrap();
        assert!(kernel.with_pooling(Extent2::new(2, 0), None).is_err());
    }

    #[test]
    fn test_pooling_divides_weights() {
        let kernel = KernelSpec::new(array![[4.0, -8.0]], Extent2::new(1, 1), Extent2::new(0, 0))
            .unwrap()
            .with_pooling(Extent2::new(2, 2), None)
            .unwrap();
        assert_eq!(kernel.weights(), &array![[1.0, -2.0]]);
        assert_eq!(kernel.pool_stride(), Extent2::new(2, 2));
    }

    #[test]
    fn test_validate_shape_mismatch() {
        let kernel =
            KernelSpec::uniform(1.0, Extent2::new(3, 3), Extent2::new(1, 1), Extent2::new(0, 0))
                .unwrap();
        let connector = ConvolutionConnector::new(kernel);
        let bad = request(grid(0, "pre", 8, 8), grid(1, "post", 8, 8));
        assert_eq!(
            connector.validate(&bad),
            Err(ConnectivityError::ShapeMismatch {
                expected: vec![6, 6],
                actual: vec![8, 8],
            })
        );
        let good = request(grid(0, "pre", 8, 8), grid(1, "post", 6, 6));
        assert!(connector.validate(&good).is_ok());
    }

    #[test]
    fn test_validate_requires_fixed_delay_and_receptors() {
        let kernel = KernelSpec::new(array![[1.0]], Extent2::new(1, 1), Extent2::new(0, 0)).unwrap();
        let connector = ConvolutionConnector::new(kernel).with_receptors("excitatory", "shunting");
        let req = request(grid(0, "pre", 4, 4), grid(1, "post", 4, 4));
        assert!(matches!(
            connector.validate(&req),
            Err(ConnectivityError::MissingReceptorType { .. })
        ));

        let kernel = KernelSpec::new(array![[1.0]], Extent2::new(1, 1), Extent2::new(0, 0)).unwrap();
        let random_delay = ConnectionRequest::builder(0, grid(0, "pre", 4, 4), grid(1, "post", 4, 4))
            .receptor("excitatory")
            .delays(ParameterDescriptor::Uniform { low: 1.0, high: 2.0 })
            .build()
            .unwrap();
        assert!(matches!(
            ConvolutionConnector::new(kernel).validate(&random_delay),
            Err(ConnectivityError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_enumerate_signs_and_padding() {
        // Cross kernel over a 3x3 image with same-padding
        let kernel = KernelSpec::new(
            array![[0.0, 1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, 1.0, 0.0]],
            Extent2::new(1, 1),
            Extent2::new(1, 1),
        )
        .unwrap();
        let mut connector = ConvolutionConnector::new(kernel);
        let req = request(grid(0, "pre", 3, 3), grid(1, "post", 3, 3));
        connector.validate(&req).unwrap();

        let block = connector
            .enumerate(&VertexSlice::whole(req.post()), &req, &mut BuildContext::new(0))
            .unwrap();
        // Centre post cell sees all five non-zero taps
        let centre: Vec<_> = block.iter().filter(|r| r.target == 4).collect();
        assert_eq!(centre.len(), 5);
        let inhibitory: Vec<u32> = centre
            .iter()
            .filter(|r| r.synapse_type == 1)
            .map(|r| r.source)
            .collect();
        assert_eq!(inhibitory, vec![3, 5]);
        assert!(centre.iter().all(|r| r.weight.to_f64() > 0.0));
        // Corner post cell loses the taps falling in the padding
        assert_eq!(block.iter().filter(|r| r.target == 0).count(), 3);
    }

    #[test]
    fn test_enumerate_with_pooling_covers_pool_block() {
        let kernel = KernelSpec::new(array![[4.0]], Extent2::new(1, 1), Extent2::new(0, 0))
            .unwrap()
            .with_pooling(Extent2::new(2, 2), None)
            .unwrap();
        let mut connector = ConvolutionConnector::new(kernel);
        let req = request(grid(0, "pre", 4, 4), grid(1, "post", 2, 2));
        connector.validate(&req).unwrap();
        let block = connector
            .enumerate(&VertexSlice::whole(req.post()), &req, &mut BuildContext::new(0))
            .unwrap();
        let sources: Vec<u32> = block.iter().filter(|r| r.target == 3).map(|r| r.source).collect();
        assert_eq!(sources, vec![10, 11, 14, 15]);
        assert!(block.iter().all(|r| r.weight.to_f64() == 1.0));
        assert_eq!(block.max_fan_in(), 4);
        assert_eq!(
            connector.max_connections_to_one_target(&req, &BoundEstimator::default()),
            4
        );
    }

    #[test]
    fn test_edge_filter_box() {
        let kernel =
            KernelSpec::uniform(1.0, Extent2::new(3, 3), Extent2::new(1, 1), Extent2::new(1, 1))
                .unwrap();
        let connector = ConvolutionConnector::new(kernel.clone());
        let req = request(grid(0, "pre", 16, 16), grid(1, "post", 16, 16));
        let post_tile = VertexSlice::with_shape(0, vec![4, 4], vec![0, 0]).unwrap();
        let near = VertexSlice::with_shape(16, vec![4, 4], vec![4, 0]).unwrap();
        let far = VertexSlice::with_shape(32, vec![4, 4], vec![8, 0]).unwrap();
        assert_eq!(kernel.receptive_field(0..=3, 0..=3).x, -1..=4);
        assert!(connector.could_connect(&req, &near, &post_tile));
        assert!(!connector.could_connect(&req, &far, &post_tile));

        let unfiltered = ConvolutionConnector::new(kernel).with_filter_edges(false);
        assert!(unfiltered.could_connect(&req, &far, &post_tile));
    }

    #[test]
    fn test_device_block_layout() {
        let kernel = KernelSpec::new(
            array![[1.0, -1.0, 0.5]],
            Extent2::new(2, 1),
            Extent2::new(0, 1),
        )
        .unwrap();
        let connector = ConvolutionConnector::new(kernel);
        let req = request(grid(0, "pre", 6, 4), grid(1, "post", 6, 2));
        connector.validate(&req).unwrap();

        let slice = VertexSlice::whole(req.post());
        let scales = WeightScales::new(vec![100.0, 50.0]);
        let target = DeviceTarget {
            post_slice: &slice,
            weight_scales: &scales,
            delay_stage: 0,
            local_delay: 1,
            weight_index: 9,
        };
        let bytes = connector.device_params(&req, &target).unwrap();
        assert_eq!(bytes.len(), CONVOLUTION_PARAMS_BYTES);
        assert_eq!(&bytes[0..4], &[1, 0, 3, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 1, 0]);
        assert_eq!(&bytes[8..12], &[0, 0, 1, 0]);
        assert_eq!(&bytes[12..16], &[0, 0, 1, 0]);
        assert_eq!(&bytes[16..20], &[9, 0, 0, 0]);
        assert_eq!(
            connector.device_weights(&req, &scales).unwrap(),
            vec![100, -50, 50]
        );
    }
}
