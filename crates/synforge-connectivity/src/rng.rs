// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Deterministic random number generation for connectivity builds.

Every random draw is taken from a `StdRng` derived from the build seed and
the [`ContextKey`] of the cache entry being filled. Results therefore depend
only on the seed and the query context, never on the order queries arrive in.
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cache::ContextKey;
use crate::diagnostics::DiagnosticSink;

/// SplitMix64 finalizer, used to spread seeds and context keys
pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Copyable seed root; safe to share across worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngSource {
    seed: u64,
}

impl RngSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng_for(&self, key: ContextKey) -> StdRng {
        StdRng::seed_from_u64(splitmix64(self.seed ^ splitmix64(key.value())))
    }
}

/// Build-time context handed to connector queries
pub struct BuildContext {
    source: RngSource,
    diagnostics: Option<Box<dyn DiagnosticSink>>,
}

impl BuildContext {
    pub fn new(seed: u64) -> Self {
        Self {
            source: RngSource::new(seed),
            diagnostics: None,
        }
    }

    /// Seed drawn from the thread RNG; the chosen seed is available via [`BuildContext::seed`]
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    pub fn with_diagnostics(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn seed(&self) -> u64 {
        self.source.seed()
    }

    pub fn rng_source(&self) -> RngSource {
        self.source
    }

    pub fn rng_for(&self, key: ContextKey) -> StdRng {
        self.source.rng_for(key)
    }

    pub fn diagnostics_mut(&mut self) -> Option<&mut (dyn DiagnosticSink + 'static)> {
        self.diagnostics.as_deref_mut()
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("seed", &self.source.seed())
            .field("diagnostics", &self.diagnostics.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_stream() {
        let ctx = BuildContext::new(1234);
        let key = ContextKey::from_parts(&[1, 2, 3]);
        let xs: [u32; 8] = ctx.rng_for(key).gen();
        let ys: [u32; 8] = ctx.rng_for(key).gen();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_different_keys_diverge() {
        let ctx = BuildContext::new(1234);
        let mut a = ctx.rng_for(ContextKey::from_parts(&[1]));
        let mut b = ctx.rng_for(ContextKey::from_parts(&[2]));
        let xs: [u64; 4] = a.gen();
        let ys: [u64; 4] = b.gen();
        assert_ne!(xs, ys);
    }

    #[test]
    fn test_seed_changes_stream() {
        let key = ContextKey::from_parts(&[5]);
        let x: u64 = BuildContext::new(1).rng_for(key).gen();
        let y: u64 = BuildContext::new(2).rng_for(key).gen();
        assert_ne!(x, y);
    }
}
