// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Division by invariant integers using multiplication (Granlund-Montgomery,
16-bit operands), for cores without a hardware divider.
*/

use crate::types::{ConnectivityError, ConnectivityResult};

/// Multiplier and shifts that divide any 16-bit value by a fixed divisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DivisionConstant {
    m: u16,
    sh1: u8,
    sh2: u8,
}

impl DivisionConstant {
    /// Constant for `divisor` in `1..=65535`
    pub fn new(divisor: u32) -> ConnectivityResult<Self> {
        if divisor == 0 || divisor > u32::from(u16::MAX) {
            return Err(ConnectivityError::InvalidParameter(format!(
                "divisor {} is outside 1..=65535",
                divisor
            )));
        }
        let d = u64::from(divisor);
        // l = ceil(log2(d))
        let l = 64 - (d - 1).leading_zeros();
        let m = (((1u64 << 16) * ((1u64 << l) - d)) / d) + 1;
        Ok(Self {
            m: m as u16,
            sh1: l.min(1) as u8,
            sh2: l.saturating_sub(1) as u8,
        })
    }

    pub fn m(&self) -> u16 {
        self.m
    }

    pub fn sh1(&self) -> u8 {
        self.sh1
    }

    pub fn sh2(&self) -> u8 {
        self.sh2
    }

    /// Packed word: `(sh2 << 24) | (sh1 << 16) | m`
    pub fn encode(&self) -> u32 {
        (u32::from(self.sh2) << 24) | (u32::from(self.sh1) << 16) | u32::from(self.m)
    }

    pub fn decode(word: u32) -> Self {
        Self {
            m: (word & 0xFFFF) as u16,
            sh1: ((word >> 16) & 0xFF) as u8,
            sh2: (word >> 24) as u8,
        }
    }

    /// `floor(a / divisor)` computed the way the device does it
    pub fn apply(&self, a: u16) -> u16 {
        let a = u32::from(a);
        let t1 = (a * u32::from(self.m)) >> 16;
        ((t1 + ((a - t1) >> self.sh1)) >> self.sh2) as u16
    }
}

/// Packed constant for `divisor`, as written into parameter regions
pub fn div_const(divisor: u32) -> ConnectivityResult<u32> {
    DivisionConstant::new(divisor).map(|c| c.encode())
}
