// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Seeds for on-core connection generators.

Random connectors can be expanded on the device by a Marsaglia KISS generator.
Each (pre slice, post slice) pair gets its own four-word seed, drawn once per
build context and reused for every later query of the same pair.
*/

use rand::Rng;

use crate::cache::{ConnectorCache, ContextKey};
use crate::rng::RngSource;

/// Upper limit (exclusive) of the fourth KISS seed word
pub const KISS_SEED_3_MODULUS: u32 = 698_769_069;

/// Draw a seed satisfying the KISS constraints: word 1 non-zero, word 3 below
/// [`KISS_SEED_3_MODULUS`]
pub fn kiss_seed<R: Rng + ?Sized>(rng: &mut R) -> [u32; 4] {
    let mut seed: [u32; 4] = rng.gen();
    while seed[1] == 0 {
        seed[1] = rng.gen();
    }
    seed[3] %= KISS_SEED_3_MODULUS;
    seed
}

/// Memoized generator seeds per slice pair
#[derive(Debug, Clone, Default)]
pub struct SeedCache {
    seeds: ConnectorCache<[u32; 4]>,
}

impl SeedCache {
    pub fn seed_for(&mut self, key: ContextKey, source: RngSource) -> [u32; 4] {
        *self
            .seeds
            .get_or_insert_with(key, || kiss_seed(&mut source.rng_for(key)))
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn invalidate(&mut self) {
        self.seeds.invalidate();
    }
}
