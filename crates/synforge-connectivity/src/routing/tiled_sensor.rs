// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Key space of a tiled event sensor.

Events enter over up to eight links and are split into sub-tiles of
`sub_width × sub_height` pixels, one per receiving core. Event keys carry the
raw `(x, y, polarity)` below the base key, placed by a [`SourceOrder`]. Within
the x field the lowest 2 bits select the link column and the top bits the
sub-tile column; within the y field the lowest bit selects the link row and
the top bits the sub-tile row. A (link, tile) key/mask pair fixes the base,
link and sub-tile bits and leaves polarity and pixel bits free.
*/

use tracing::debug;

use super::key_space::{BitField, KeyAndMask, KeyField, RoutingKeySpec};
use super::source_order::{FieldShifts, SourceOrder};
use super::{get_n_bits, low_mask};
use crate::population::VertexSlice;
use crate::types::{ConnectivityError, ConnectivityResult};

const LINK_X_BITS: u32 = 2;
const LINK_Y_BITS: u32 = 1;
const MIN_SUB_WIDTH: u32 = 1 << LINK_X_BITS;
const MIN_SUB_HEIGHT: u32 = 1 << LINK_Y_BITS;
const MAX_LINK_ID: u32 = 15;

/// One sensor event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorEvent {
    pub x: u32,
    pub y: u32,
    pub polarity: bool,
}

/// Mask and shift pair programmed into the sensor interface for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRegister {
    /// Field bits in key position
    pub mask: u32,
    pub shift: u32,
}

impl FieldRegister {
    fn place(&self, value: u32) -> u32 {
        (value << self.shift) & self.mask
    }

    fn extract(&self, key: u32) -> u32 {
        (key & self.mask) >> self.shift
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRegisters {
    pub polarity: FieldRegister,
    pub x: FieldRegister,
    pub y: FieldRegister,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiledSensorKeySpace {
    width: u32,
    height: u32,
    sub_width: u32,
    sub_height: u32,
    order: SourceOrder,
    x_bits: u32,
    y_bits: u32,
    shifts: FieldShifts,
    spec: RoutingKeySpec,
}

impl TiledSensorKeySpace {
    pub fn new(
        base_key: u32,
        width: u32,
        height: u32,
        sub_width: u32,
        sub_height: u32,
        order: SourceOrder,
    ) -> ConnectivityResult<Self> {
        if !sub_width.is_power_of_two() || !sub_height.is_power_of_two() {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "sub-tile {}x{} must have power-of-two sides",
                sub_width, sub_height
            )));
        }
        if sub_width < MIN_SUB_WIDTH || sub_height < MIN_SUB_HEIGHT {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "sub-tile {}x{} is smaller than the {}x{} link grid",
                sub_width, sub_height, MIN_SUB_WIDTH, MIN_SUB_HEIGHT
            )));
        }

        let x_bits = get_n_bits(width);
        let y_bits = get_n_bits(height);
        if x_bits < LINK_X_BITS || y_bits < LINK_Y_BITS {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "sensor {}x{} is too small to spread over the links",
                width, height
            )));
        }
        let key_shift = x_bits + y_bits + 1;
        if key_shift > 32 {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "sensor {}x{} needs {} key bits",
                width, height, key_shift
            )));
        }

        // A tile wider than the sensor leaves no sub-tile column bits
        let sub_x_bits = x_bits.saturating_sub(sub_width.trailing_zeros());
        let sub_y_bits = y_bits.saturating_sub(sub_height.trailing_zeros());
        let shifts = order.shifts(x_bits, y_bits);

        let fields = vec![
            (KeyField::Polarity, BitField::new(shifts.polarity, 1)),
            (KeyField::LinkX, BitField::new(shifts.x, LINK_X_BITS)),
            (
                KeyField::PixelX,
                BitField::new(shifts.x + LINK_X_BITS, x_bits - LINK_X_BITS - sub_x_bits),
            ),
            (
                KeyField::SubTileX,
                BitField::new(shifts.x + x_bits - sub_x_bits, sub_x_bits),
            ),
            (KeyField::LinkY, BitField::new(shifts.y, LINK_Y_BITS)),
            (
                KeyField::PixelY,
                BitField::new(shifts.y + LINK_Y_BITS, y_bits - LINK_Y_BITS - sub_y_bits),
            ),
            (
                KeyField::SubTileY,
                BitField::new(shifts.y + y_bits - sub_y_bits, sub_y_bits),
            ),
        ];
        let spec = RoutingKeySpec::new(base_key, key_shift, fields)?;

        debug!(
            target: "synforge-connectivity",
            "Sensor {}x{} in {}x{} tiles: {} x bits, {} y bits, order {:?}",
            width,
            height,
            sub_width,
            sub_height,
            x_bits,
            y_bits,
            order
        );

        Ok(Self {
            width,
            height,
            sub_width,
            sub_height,
            order,
            x_bits,
            y_bits,
            shifts,
            spec,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> SourceOrder {
        self.order
    }

    pub fn x_bits(&self) -> u32 {
        self.x_bits
    }

    pub fn y_bits(&self) -> u32 {
        self.y_bits
    }

    pub fn key_spec(&self) -> &RoutingKeySpec {
        &self.spec
    }

    pub fn n_tiles_per_row(&self) -> u32 {
        self.width.div_ceil(self.sub_width)
    }

    pub fn n_tile_rows(&self) -> u32 {
        self.height.div_ceil(self.sub_height)
    }

    pub fn n_tiles(&self) -> u32 {
        self.n_tiles_per_row() * self.n_tile_rows()
    }

    pub fn atoms_per_tile(&self) -> u32 {
        self.sub_width * self.sub_height
    }

    /// Input link identifiers, the odd numbers 1 to 15
    pub fn link_ids() -> impl Iterator<Item = u32> {
        (1..=MAX_LINK_ID).step_by(2)
    }

    /// (column, row) of a link in the 4 x 2 link grid
    fn link_position(link: u32) -> ConnectivityResult<(u32, u32)> {
        if link % 2 == 0 || link > MAX_LINK_ID {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "link {} is not an odd number between 1 and {}",
                link, MAX_LINK_ID
            )));
        }
        let index = (link - 1) / 2;
        Ok((index % 4, index / 4))
    }

    fn tile_position(&self, tile: u32) -> ConnectivityResult<(u32, u32)> {
        if tile >= self.n_tiles() {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "tile {} is outside the {} tiles of the sensor",
                tile,
                self.n_tiles()
            )));
        }
        let per_row = self.n_tiles_per_row();
        Ok((tile % per_row, tile / per_row))
    }

    /// Routing entry taking the events of one link into one tile
    pub fn key_and_mask(&self, link: u32, tile: u32) -> ConnectivityResult<KeyAndMask> {
        let (link_x, link_y) = Self::link_position(link)?;
        let (tile_x, tile_y) = self.tile_position(tile)?;
        let key = self.spec.compose(&[
            (KeyField::SubTileX, tile_x),
            (KeyField::LinkX, link_x),
            (KeyField::SubTileY, tile_y),
            (KeyField::LinkY, link_y),
        ])?;
        let mask = self.spec.base().mask
            | self.spec.mask_of(&[
                KeyField::SubTileX,
                KeyField::LinkX,
                KeyField::SubTileY,
                KeyField::LinkY,
            ])?;
        Ok(KeyAndMask::new(key, mask))
    }

    /// Atoms of one tile in the sensor population
    pub fn tile_slice(&self, tile: u32) -> ConnectivityResult<VertexSlice> {
        let (tile_x, tile_y) = self.tile_position(tile)?;
        VertexSlice::with_shape(
            tile * self.atoms_per_tile(),
            vec![self.sub_width, self.sub_height],
            vec![tile_x * self.sub_width, tile_y * self.sub_height],
        )
    }

    pub fn field_registers(&self) -> FieldRegisters {
        FieldRegisters {
            polarity: FieldRegister {
                mask: 1 << self.shifts.polarity,
                shift: self.shifts.polarity,
            },
            x: FieldRegister {
                mask: low_mask(self.x_bits) << self.shifts.x,
                shift: self.shifts.x,
            },
            y: FieldRegister {
                mask: low_mask(self.y_bits) << self.shifts.y,
                shift: self.shifts.y,
            },
        }
    }

    fn check_position(&self, x: u32, y: u32) -> ConnectivityResult<()> {
        if x >= self.width || y >= self.height {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "event ({}, {}) is outside the {}x{} sensor",
                x, y, self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn event_key(&self, event: SensorEvent) -> ConnectivityResult<u32> {
        self.check_position(event.x, event.y)?;
        let registers = self.field_registers();
        Ok(self.spec.base().key
            | registers.polarity.place(u32::from(event.polarity))
            | registers.x.place(event.x)
            | registers.y.place(event.y))
    }

    pub fn decode_event_key(&self, key: u32) -> ConnectivityResult<SensorEvent> {
        if !self.spec.base().matches(key) {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "key {:#010x} is not in this sensor's key space",
                key
            )));
        }
        let registers = self.field_registers();
        let event = SensorEvent {
            x: registers.x.extract(key),
            y: registers.y.extract(key),
            polarity: registers.polarity.extract(key) != 0,
        };
        self.check_position(event.x, event.y)?;
        Ok(event)
    }
}
