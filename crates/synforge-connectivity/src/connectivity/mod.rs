// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Connector implementations.

Each topology lives in its own module and implements [`Connector`]:

- `all_to_all`, `one_to_one`: deterministic patterns
- `fixed_probability`, `fixed_number`: random patterns with generator support
- `convolution`, `pool_dense`: grid patterns encoded as local-only blocks
*/

pub mod all_to_all;
pub mod connector;
pub mod convolution;
pub mod fixed_number;
pub mod fixed_probability;
pub mod one_to_one;
pub mod pool_dense;

pub use all_to_all::AllToAllConnector;
pub use connector::{connected_pre_tiles, Connector};
pub use convolution::{ConvolutionConnector, KernelSpec, ReceptiveField, CONVOLUTION_PARAMS_BYTES};
pub use fixed_number::{draw_partners, FixedNumberConnector, Side};
pub use fixed_probability::FixedProbabilityConnector;
pub use one_to_one::OneToOneConnector;
pub use pool_dense::{PoolDenseConnector, PoolDenseWeights};
