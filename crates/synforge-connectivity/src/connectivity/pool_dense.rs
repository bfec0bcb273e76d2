// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Average pooling followed by a dense layer.

The pre population is pooled per dimension by `pool_stride`, then every
pooled cell connects to every post atom with its own signed weight.
*/

use ndarray::Array2;

use crate::bounds::{BoundEstimator, DelayWindow};
use crate::connectivity::Connector;
use crate::device::{
    div_const, pad_to_word, DeviceEncodingId, DeviceTarget, RegionWriter,
};
use crate::population::VertexSlice;
use crate::request::ConnectionRequest;
use crate::rng::BuildContext;
use crate::synaptic_block::{SynapticBlock, SynapticRecord};
use crate::types::{ConnectivityError, ConnectivityResult, FixedPoint};

/// Dense weights between pooled pre cells and post atoms
#[derive(Debug, Clone, PartialEq)]
pub enum PoolDenseWeights {
    /// One weight for every pair
    Uniform(f64),
    /// Rows are pooled pre cells in raster order, columns are post atoms
    Matrix(Array2<f64>),
}

impl PoolDenseWeights {
    fn get(&self, pooled: usize, post: usize) -> f64 {
        match self {
            Self::Uniform(w) => *w,
            Self::Matrix(m) => m[[pooled, post]],
        }
    }

    fn max_abs(&self) -> f64 {
        match self {
            Self::Uniform(w) => w.abs(),
            Self::Matrix(m) => m.iter().fold(0.0, |acc: f64, w| acc.max(w.abs())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolDenseConnector {
    /// Already divided by the pooling area
    weights: PoolDenseWeights,
    pool_shape: Vec<u32>,
    pool_stride: Vec<u32>,
    positive_receptor: String,
    negative_receptor: String,
}

impl PoolDenseConnector {
    pub fn new(
        weights: PoolDenseWeights,
        pool_shape: Vec<u32>,
        pool_stride: Option<Vec<u32>>,
    ) -> ConnectivityResult<Self> {
        let pool_stride = pool_stride.unwrap_or_else(|| pool_shape.clone());
        if pool_shape.is_empty() || pool_shape.len() != pool_stride.len() {
            return Err(ConnectivityError::MalformedKernelSpec(format!(
                "pool shape {:?} and pool stride {:?} must have the same dimensions",
                pool_shape, pool_stride
            )));
        }
        let in_range = |v: &u32| (1..=u32::from(u16::MAX)).contains(v);
        if !pool_shape.iter().all(in_range) || !pool_stride.iter().all(in_range) {
            return Err(ConnectivityError::MalformedKernelSpec(format!(
                "pool shape {:?} and pool stride {:?} must be between 1 and {}",
                pool_shape,
                pool_stride,
                u16::MAX
            )));
        }

        let area: f64 = pool_shape.iter().map(|&v| f64::from(v)).product();
        let weights = match weights {
            PoolDenseWeights::Uniform(w) if w.is_finite() => PoolDenseWeights::Uniform(w / area),
            PoolDenseWeights::Matrix(m) if m.iter().all(|w| w.is_finite()) => {
                PoolDenseWeights::Matrix(m.mapv(|w| w / area))
            }
            _ => {
                return Err(ConnectivityError::MalformedKernelSpec(
                    "pool dense weights must be finite".to_string(),
                ))
            }
        };

        Ok(Self {
            weights,
            pool_shape,
            pool_stride,
            positive_receptor: "excitatory".to_string(),
            negative_receptor: "inhibitory".to_string(),
        })
    }

    pub fn with_receptors(mut self, positive: &str, negative: &str) -> Self {
        self.positive_receptor = positive.to_string();
        self.negative_receptor = negative.to_string();
        self
    }

    pub fn weights(&self) -> &PoolDenseWeights {
        &self.weights
    }

    pub fn pool_shape(&self) -> &[u32] {
        &self.pool_shape
    }

    pub fn pool_stride(&self) -> &[u32] {
        &self.pool_stride
    }

    /// Pre shape after pooling, dimension 0 first
    pub fn pooled_shape(&self, pre_shape: &[u32]) -> Vec<u32> {
        pre_shape
            .iter()
            .zip(&self.pool_stride)
            .map(|(&size, &stride)| size / stride)
            .collect()
    }

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
                "pool dense connections need a single fixed delay".to_string(),
            )
        })
    }

    /// Pre raster indices pooled into the cell with these coordinates
    fn pool_members(&self, cell: &[u32], pre_shape: &[u32]) -> Vec<u32> {
        let mut members = vec![0u32];
        let mut stride = 1u32;
        for (dim, (&coord, &ps)) in cell.iter().zip(&self.pool_stride).enumerate() {
            let base = coord * ps;
            members = members
                .iter()
                .flat_map(|&partial| (0..ps).map(move |offset| partial + (base + offset) * stride))
                .collect();
            stride *= pre_shape[dim];
        }
        members
    }
}

/// Coordinates of a raster index, dimension 0 fastest
fn unravel(mut raster: u32, shape: &[u32]) -> Vec<u32> {
    shape
        .iter()
        .map(|&size| {
            let coord = raster % size;
            raster /= size;
            coord
        })
        .collect()
}

impl Connector for PoolDenseConnector {
    fn name(&self) -> &'static str {
        "PoolDenseConnector"
    }

    fn validate(&self, request: &ConnectionRequest) -> ConnectivityResult<()> {
        let pre_shape = &request.pre().shape;
        if pre_shape.len() != self.pool_stride.len() {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "pool stride {:?} does not match the {}D pre population",
                self.pool_stride,
                pre_shape.len()
            )));
        }
        let pooled = self.pooled_shape(pre_shape);
        if pooled.contains(&0) {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "pre shape {:?} is smaller than one pooling step {:?}",
                pre_shape, self.pool_stride
            )));
        }
        if let PoolDenseWeights::Matrix(m) = &self.weights {
            let n_pooled: u32 = pooled.iter().product();
            let expected = (n_pooled as usize, request.n_post() as usize);
            if m.dim() != expected {
                return Err(ConnectivityError::InvalidParameter(format!(
                    "weight matrix is {:?}, expected {:?} (pooled pre by post)",
                    m.dim(),
                    expected
                )));
            }
        }
        self.synapse_types(request)?;
        Self::fixed_delay(request)?;
        Ok(())
    }

    fn weight_bound(&self, _request: &ConnectionRequest) -> f64 {
        self.weights.max_abs()
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
        _ctx: &mut BuildContext,
    ) -> ConnectivityResult<SynapticBlock> {
        let pre_shape = &request.pre().shape;
        let pooled = self.pooled_shape(pre_shape);
        let n_pooled: u32 = pooled.iter().product();
        let (positive, negative) = self.synapse_types(request)?;
        let delay = request.delay_steps(Self::fixed_delay(request)?);

        let members: Vec<Vec<u32>> = (0..n_pooled)
            .map(|cell| self.pool_members(&unravel(cell, &pooled), pre_shape))
            .collect();

        let mut records = Vec::new();
        for target in post_slice.raster_atoms(&request.post().shape) {
            for (cell, sources) in members.iter().enumerate() {
                let weight = self.weights.get(cell, target as usize);
                if weight == 0.0 {
                    continue;
                }
                let synapse_type = if weight > 0.0 { positive } else { negative };
                let fixed = FixedPoint::from_f64(weight.abs());
                records.extend(sources.iter().map(|&source| SynapticRecord {
                    source,
                    target,
                    weight: fixed,
                    delay,
                    synapse_type,
                }));
            }
        }
        Ok(SynapticBlock::from_records(records))
    }

    fn device_encoding_id(&self) -> DeviceEncodingId {
        DeviceEncodingId::LocalOnlyPoolDense
    }

    fn device_params_size(&self, request: &ConnectionRequest, target: &DeviceTarget<'_>) -> usize {
        let pooled = self.pooled_shape(&request.pre().shape);
        let n_pooled: usize = pooled.iter().map(|&v| v as usize).product();
        let n_weights = n_pooled * target.post_slice.n_atoms() as usize;
        3 * 4 + 8 * pooled.len() + pad_to_word(2 * n_weights)
    }

    fn write_device_params(
        &self,
        request: &ConnectionRequest,
        target: &DeviceTarget<'_>,
        writer: &mut RegionWriter,
    ) -> ConnectivityResult<()> {
        let (positive, negative) = self.synapse_types(request)?;
        let pooled = self.pooled_shape(&request.pre().shape);
        let n_pooled: u32 = pooled.iter().product();

        writer.write_short_pair(u16::from(positive), u16::from(negative))?;
        writer.write_short_pair(target.delay_stage, target.local_delay)?;
        writer.write_u32(pooled.len() as u32)?;
        for (&size, &stride) in pooled.iter().zip(&self.pool_stride).rev() {
            writer.write_u32(size)?;
            writer.write_u32(div_const(stride)?)?;
        }

        let post_atoms = target.post_slice.raster_atoms(&request.post().shape);
        for cell in 0..n_pooled as usize {
            for &post in &post_atoms {
                let weight = self.weights.get(cell, post as usize);
                writer.write_i16(target.weight_scales.encode_signed(weight, positive, negative)?)?;
            }
        }
        writer.align_to_word()
    }

    fn invalidate(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::WeightScales;
    use crate::parameters::ParameterDescriptor;
    use crate::population::Population;
    use ndarray::array;
    use std::sync::Arc;

    fn request(pre_shape: Vec<u32>, n_post: u32) -> ConnectionRequest {
        let pre = Arc::new(Population::new(0, "pre", pre_shape, &["excitatory"]).unwrap());
        let post = Arc::new(
            Population::new(1, "post", vec![n_post], &["excitatory", "inhibitory"]).unwrap(),
        );
        ConnectionRequest::builder(0, pre, post)
            .receptor("excitatory")
            .delays(ParameterDescriptor::Fixed(2.0))
            .build()
            .unwrap()
    }

    #[test]
    fn test_rejects_bad_pooling() {
        assert!(PoolDenseConnector::new(PoolDenseWeights::Uniform(1.0), vec![0, 2], None).is_err());
        assert!(
            PoolDenseConnector::new(PoolDenseWeights::Uniform(1.0), vec![2, 2], Some(vec![2]))
                .is_err()
        );
        assert!(PoolDenseConnector::new(PoolDenseWeights::Uniform(f64::INFINITY), vec![2], None)
            .is_err());
    }

    #[test]
    fn test_validate_matrix_shape() {
        let req = request(vec![4, 2], 3);
        let wrong = PoolDenseConnector::new(
            PoolDenseWeights::Matrix(Array2::zeros((3, 3))),
            vec![2, 2],
            None,
        )
        .unwrap();
        assert!(matches!(
            wrong.validate(&req),
            Err(ConnectivityError::InvalidParameter(_))
        ));
        let right = PoolDenseConnector::new(
            PoolDenseWeights::Matrix(Array2::zeros((2, 3))),
            vec![2, 2],
            None,
        )
        .unwrap();
        assert!(right.validate(&req).is_ok());
    }

    #[test]
    fn test_enumerate_pools_then_connects() {
        // 4x2 pre pooled 2x2 gives two cells: atoms {0,1,4,5} and {2,3,6,7}
        let req = request(vec![4, 2], 2);
        let mut connector = PoolDenseConnector::new(
            PoolDenseWeights::Matrix(array![[4.0, 0.0], [-8.0, 4.0]]),
            vec![2, 2],
            None,
        )
        .unwrap();
        connector.validate(&req).unwrap();
        let block = connector
            .enumerate(&VertexSlice::linear(0, 1).unwrap(), &req, &mut BuildContext::new(0))
            .unwrap();

        let to_zero: Vec<(u32, u8, f64)> = block
            .iter()
            .filter(|r| r.target == 0)
            .map(|r| (r.source, r.synapse_type, r.weight.to_f64()))
            .collect();
        assert_eq!(
            to_zero,
            vec![
                (0, 0, 1.0),
                (1, 0, 1.0),
                (2, 1, 2.0),
                (3, 1, 2.0),
                (4, 0, 1.0),
                (5, 0, 1.0),
                (6, 1, 2.0),
                (7, 1, 2.0),
            ]
        );
        let to_one: Vec<u32> = block.iter().filter(|r| r.target == 1).map(|r| r.source).collect();
        assert_eq!(to_one, vec![2, 3, 6, 7]);
        assert!(block.iter().all(|r| r.delay == 2));
    }

    #[test]
    fn test_device_block_layout() {
        let req = request(vec![4, 2], 3);
        let connector = PoolDenseConnector::new(
            PoolDenseWeights::Matrix(array![[4.0, 8.0, 0.0], [-4.0, 0.0, 12.0]]),
            vec![2, 2],
            None,
        )
        .unwrap();
        connector.validate(&req).unwrap();

        let slice = VertexSlice::linear(1, 2).unwrap();
        let scales = WeightScales::new(vec![10.0, 100.0]);
        let target = DeviceTarget {
            post_slice: &slice,
            weight_scales: &scales,
            delay_stage: 1,
            local_delay: 3,
            weight_index: 0,
        };
        let size = connector.device_params_size(&req, &target);
        // header, two dims, four weights
        assert_eq!(size, 12 + 16 + 8);
        let bytes = connector.device_params(&req, &target).unwrap();
        assert_eq!(bytes.len(), size);
        assert_eq!(&bytes[0..4], &[0, 0, 1, 0]);
        assert_eq!(&bytes[4..8], &[1, 0, 3, 0]);
        assert_eq!(&bytes[8..12], &[2, 0, 0, 0]);
        // Most significant dimension first: pooled height 1, then width 2
        assert_eq!(&bytes[12..16], &[1, 0, 0, 0]);
        assert_eq!(&bytes[20..24], &[2, 0, 0, 0]);

        let weights: Vec<i16> = bytes[28..36]
            .chunks(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(weights, vec![20, 0, 0, 30]);
    }

    #[test]
    fn test_odd_weight_count_is_padded() {
        let req = request(vec![2], 3);
        let connector =
            PoolDenseConnector::new(PoolDenseWeights::Uniform(1.0), vec![2], None).unwrap();
        let slice = VertexSlice::linear(0, 2).unwrap();
        let scales = WeightScales::new(vec![1.0, 1.0]);
        let target = DeviceTarget {
            post_slice: &slice,
            weight_scales: &scales,
            delay_stage: 0,
            local_delay: 1,
            weight_index: 0,
        };
        let bytes = connector.device_params(&req, &target).unwrap();
        assert_eq!(bytes.len(), 12 + 8 + 8);
    }
}
