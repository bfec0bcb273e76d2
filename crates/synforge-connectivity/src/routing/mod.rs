// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Multicast routing keys and masks.

- `key_space`: named bit fields partitioning a 32-bit key
- `source_order`: polarity/x/y field placements for sensor events
- `tiled_sensor`: per-(link, tile) key/mask pairs for a tiled event sensor
- `core_routing`: key, mask and core mask for a population split over cores
*/

pub mod core_routing;
pub mod key_space;
pub mod source_order;
pub mod tiled_sensor;

pub use core_routing::SourceRouting;
pub use key_space::{BitField, KeyAndMask, KeyField, RoutingKeySpec};
pub use source_order::{FieldShifts, SourceOrder};
pub use tiled_sensor::{FieldRegister, FieldRegisters, SensorEvent, TiledSensorKeySpace};

/// Bits needed to hold `n` distinct values (1 bit for a single value, 0 for none)
pub fn get_n_bits(n: u32) -> u32 {
    match n {
        0 => 0,
        1 => 1,
        n => 32 - (n - 1).leading_zeros(),
    }
}

/// The lowest `width` bits set; saturates at all 32
pub(crate) fn low_mask(width: u32) -> u32 {
    ((1u64 << width.min(32)) - 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_n_bits() {
        assert_eq!(get_n_bits(0), 0);
        assert_eq!(get_n_bits(1), 1);
        assert_eq!(get_n_bits(2), 1);
        assert_eq!(get_n_bits(3), 2);
        assert_eq!(get_n_bits(4), 2);
        assert_eq!(get_n_bits(5), 3);
        assert_eq!(get_n_bits(640), 10);
        assert_eq!(get_n_bits(u32::MAX), 32);
    }

    #[test]
    fn test_low_mask() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(5), 0b11111);
        assert_eq!(low_mask(32), u32::MAX);
    }
}
