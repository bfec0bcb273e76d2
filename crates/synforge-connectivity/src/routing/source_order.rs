// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Placement of the polarity, x and y fields below the base key.

Each order is a static table of shift functions over the x and y bit widths,
named by field from most to least significant.
*/

use serde::{Deserialize, Serialize};

use super::low_mask;

type ShiftFn = fn(x_bits: u32, y_bits: u32) -> u32;

struct OrderTable {
    polarity: ShiftFn,
    x: ShiftFn,
    y: ShiftFn,
}

static ORDER_TABLES: [OrderTable; 6] = [
    // PXY
    OrderTable {
        polarity: |xb, yb| xb + yb,
        x: |_, yb| yb,
        y: |_, _| 0,
    },
    // XPY
    OrderTable {
        polarity: |_, yb| yb,
        x: |_, yb| yb + 1,
        y: |_, _| 0,
    },
    // XYP
    OrderTable {
        polarity: |_, _| 0,
        x: |_, yb| yb + 1,
        y: |_, _| 1,
    },
    // PYX
    OrderTable {
        polarity: |xb, yb| xb + yb,
        x: |_, _| 0,
        y: |xb, _| xb,
    },
    // YPX
    OrderTable {
        polarity: |xb, _| xb,
        x: |_, _| 0,
        y: |xb, _| xb + 1,
    },
    // YXP
    OrderTable {
        polarity: |_, _| 0,
        x: |_, _| 1,
        y: |xb, _| xb + 1,
    },
];

/// Field order of a sensor event key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum SourceOrder {
    PXY = 1,
    XPY = 2,
    XYP = 3,
    PYX = 4,
    YPX = 5,
    YXP = 6,
}

/// Bit positions of the three event fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldShifts {
    pub polarity: u32,
    pub x: u32,
    pub y: u32,
}

impl SourceOrder {
    pub const ALL: [SourceOrder; 6] = [
        Self::PXY,
        Self::XPY,
        Self::XYP,
        Self::PYX,
        Self::YPX,
        Self::YXP,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|order| order.id() == id)
    }

    fn table(self) -> &'static OrderTable {
        &ORDER_TABLES[(self.id() - 1) as usize]
    }

    pub fn shifts(self, x_bits: u32, y_bits: u32) -> FieldShifts {
        let table = self.table();
        FieldShifts {
            polarity: (table.polarity)(x_bits, y_bits),
            x: (table.x)(x_bits, y_bits),
            y: (table.y)(x_bits, y_bits),
        }
    }

    /// (polarity, x, y) masks in key position
    pub fn masks(self, x_bits: u32, y_bits: u32) -> (u32, u32, u32) {
        let shifts = self.shifts(x_bits, y_bits);
        (
            1 << shifts.polarity,
            low_mask(x_bits) << shifts.x,
            low_mask(y_bits) << shifts.y,
        )
    }
}
