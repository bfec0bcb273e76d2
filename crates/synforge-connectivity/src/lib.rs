// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Synforge Connectivity
//!
//! Compiles abstract connectivity rules into what a many-core neuromorphic
//! target needs at load time:
//! - explicit synapse lists for a post slice (host path)
//! - fixed-layout binary parameter blocks expanded on the core (device path)
//! - 32-bit multicast routing keys and masks
//!
//! ## Design
//! - **Statistically safe buffers**: capacity bounds never undercount except
//!   with a configured failure probability
//! - **Deterministic**: every random draw derives from one build seed
//! - **Exact regions**: encoded sizes are computed before writing and checked
//!   after
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use synforge_connectivity::prelude::*;
//!
//! let pre = Arc::new(Population::new(0, "retina", vec![32, 32], &["excitatory"])?);
//! let post = Arc::new(Population::new(1, "v1", vec![1000], &["excitatory"])?);
//! let request = ConnectionRequest::builder(0, pre, post).receptor("excitatory").build()?;
//! let mut projection = Projection::new(request, FixedNumberConnector::post(10))?;
//!
//! let bounds = BoundEstimator::default();
//! let mut ctx = BuildContext::new(42);
//! let block = SynapticBlockBuilder::new(&bounds)
//!     .build(&mut projection, &VertexSlice::linear(0, 255)?, &mut ctx)?;
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bounds;
pub mod cache;
pub mod connectivity;
pub mod device;
pub mod diagnostics;
pub mod parameters;
pub mod population;
pub mod request;
pub mod rng;
pub mod routing;
pub mod synaptic_block;
pub mod types;

pub use bounds::{max_connections, BoundEstimator, DelayWindow};
pub use cache::{ConnectorCache, ContextKey};
pub use connectivity::*;
pub use device::{
    DeviceEncodingId, DeviceTarget, DivisionConstant, IncomingProjection, LocalOnlyEncoder,
    LocalOnlyRegions, RegionWriter, SourceVertex, WeightScales,
};
pub use diagnostics::{CsvDirectorySink, DiagnosticSink, MemorySink, SelectionDump};
pub use parameters::ParameterDescriptor;
pub use population::{Population, VertexSlice};
pub use request::{ConnectionRequest, Projection};
pub use rng::{BuildContext, RngSource};
pub use routing::{
    get_n_bits, KeyAndMask, RoutingKeySpec, SensorEvent, SourceOrder, SourceRouting,
    TiledSensorKeySpace,
};
pub use synaptic_block::{SynapticBlock, SynapticBlockBuilder, SynapticRecord};
pub use types::{ConnectivityError, ConnectivityResult, Extent2, FixedPoint};

/// Common imports for building connectivity
pub mod prelude {
    pub use crate::bounds::BoundEstimator;
    pub use crate::connectivity::{
        AllToAllConnector, Connector, ConvolutionConnector, FixedNumberConnector,
        FixedProbabilityConnector, KernelSpec, OneToOneConnector, PoolDenseConnector,
        PoolDenseWeights,
    };
    pub use crate::parameters::ParameterDescriptor;
    pub use crate::population::{Population, VertexSlice};
    pub use crate::request::{ConnectionRequest, Projection};
    pub use crate::rng::BuildContext;
    pub use crate::synaptic_block::SynapticBlockBuilder;
    pub use crate::types::{ConnectivityError, ConnectivityResult, Extent2};
}
