// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Routing of a population split over several cores.

Keys are `base | core << mask_shift | colour << atom_bits | atom`. A receiving
core recovers the sending core with `(key >> mask_shift) & core_mask`.
*/

use serde::{Deserialize, Serialize};

use super::key_space::KeyAndMask;
use super::{get_n_bits, low_mask};
use crate::types::{ConnectivityError, ConnectivityResult};

/// Largest core mask that fits the 16-bit field of a source header
const MAX_CORE_BITS: u32 = 16;
/// Colour bits are carried in a 3-bit field
const MAX_COLOUR_BITS: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRouting {
    /// Covers every core of the population
    pub key_and_mask: KeyAndMask,
    pub core_mask: u32,
    pub mask_shift: u32,
    pub n_colour_bits: u8,
}

impl SourceRouting {
    pub fn for_cores(
        base_key: u32,
        n_cores: u32,
        atoms_per_core: u32,
        n_colour_bits: u8,
    ) -> ConnectivityResult<Self> {
        if n_colour_bits > MAX_COLOUR_BITS {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "{} colour bits exceed the limit of {}",
                n_colour_bits, MAX_COLOUR_BITS
            )));
        }
        let core_bits = get_n_bits(n_cores);
        if core_bits > MAX_CORE_BITS {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "{} cores need {} bits, limit is {}",
                n_cores, core_bits, MAX_CORE_BITS
            )));
        }
        let mask_shift = get_n_bits(atoms_per_core) + u32::from(n_colour_bits);
        let total = mask_shift + core_bits;
        if total > 32 || u64::from(base_key) >= (1u64 << (32 - total)) {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "base key {:#x} does not fit above {} routing bits",
                base_key, total
            )));
        }

        let key = if total == 32 { 0 } else { base_key << total };
        Ok(Self {
            key_and_mask: KeyAndMask::new(key, !low_mask(total)),
            core_mask: low_mask(core_bits),
            mask_shift,
            n_colour_bits,
        })
    }

    /// First key sent by one core
    pub fn core_key(&self, core: u32) -> u32 {
        self.key_and_mask.key | (core & self.core_mask).checked_shl(self.mask_shift).unwrap_or(0)
    }

    /// Core that sent a key
    pub fn core_of(&self, key: u32) -> u32 {
        key.checked_shr(self.mask_shift).unwrap_or(0) & self.core_mask
    }
}
