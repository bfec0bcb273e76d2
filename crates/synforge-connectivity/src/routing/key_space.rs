// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Named bit fields of a 32-bit routing key.

A [`RoutingKeySpec`] holds a base key in its top bits and a set of fields
below it. Construction checks that the fields never overlap and that base and
fields together cover every bit of the key exactly once.
*/

use serde::{Deserialize, Serialize};

use super::low_mask;
use crate::types::{ConnectivityError, ConnectivityResult};

/// Field of a sensor event key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyField {
    Polarity,
    SubTileX,
    PixelX,
    LinkX,
    SubTileY,
    PixelY,
    LinkY,
}

/// `width` bits starting at `shift`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitField {
    pub shift: u32,
    pub width: u32,
}

impl BitField {
    pub const fn new(shift: u32, width: u32) -> Self {
        Self { shift, width }
    }

    /// Mask in key position; bits above 31 are dropped
    pub fn mask(&self) -> u32 {
        if self.shift >= 32 {
            return 0;
        }
        ((u64::from(low_mask(self.width)) << self.shift) & u64::from(u32::MAX)) as u32
    }

    fn fits_in_key(&self) -> bool {
        self.shift + self.width <= 32
    }

    /// Value moved into key position, or `None` if it does not fit
    pub fn place(&self, value: u32) -> Option<u32> {
        if value > low_mask(self.width) {
            return None;
        }
        if self.width == 0 {
            return Some(0);
        }
        Some(value << self.shift)
    }

    pub fn extract(&self, key: u32) -> u32 {
        if self.width == 0 {
            return 0;
        }
        (key & self.mask()) >> self.shift
    }
}

/// Multicast routing entry: a key matches when `key & mask == self.key`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyAndMask {
    pub key: u32,
    pub mask: u32,
}

impl KeyAndMask {
    pub const fn new(key: u32, mask: u32) -> Self {
        Self { key, mask }
    }

    pub fn matches(&self, key: u32) -> bool {
        key & self.mask == self.key
    }
}

/// Base key plus named fields exactly partitioning 32 bits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKeySpec {
    base_key: u32,
    base_shift: u32,
    fields: Vec<(KeyField, BitField)>,
}

impl RoutingKeySpec {
    /// `base_key` occupies bits `base_shift..32`
    pub fn new(
        base_key: u32,
        base_shift: u32,
        fields: Vec<(KeyField, BitField)>,
    ) -> ConnectivityResult<Self> {
        if base_shift > 32 {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "base key shift {} is beyond a 32-bit key",
                base_shift
            )));
        }
        let base_field = BitField::new(base_shift, 32 - base_shift);
        if base_field.place(base_key).is_none() {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "base key {:#x} does not fit in {} bits",
                base_key,
                32 - base_shift
            )));
        }

        let mut covered = base_field.mask();
        for (name, field) in &fields {
            if !field.fits_in_key() {
                return Err(ConnectivityError::InvalidGeometry(format!(
                    "{:?} field {:?} extends past bit 31",
                    name, field
                )));
            }
            if covered & field.mask() != 0 {
                return Err(ConnectivityError::InvalidGeometry(format!(
                    "{:?} field {:?} overlaps another field",
                    name, field
                )));
            }
            covered |= field.mask();
        }
        if covered != u32::MAX {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "fields leave key bits {:#010x} unassigned",
                !covered
            )));
        }

        Ok(Self {
            base_key,
            base_shift,
            fields,
        })
    }

    pub fn base_key(&self) -> u32 {
        self.base_key
    }

    /// Base key in key position with its mask
    pub fn base(&self) -> KeyAndMask {
        let field = BitField::new(self.base_shift, 32 - self.base_shift);
        KeyAndMask::new(field.place(self.base_key).unwrap_or(0), field.mask())
    }

    pub fn fields(&self) -> &[(KeyField, BitField)] {
        &self.fields
    }

    pub fn field(&self, name: KeyField) -> Option<BitField> {
        self.fields
            .iter()
            .find(|(field_name, _)| *field_name == name)
            .map(|(_, field)| *field)
    }

    fn require(&self, name: KeyField) -> ConnectivityResult<BitField> {
        self.field(name).ok_or_else(|| {
            ConnectivityError::InvalidGeometry(format!("key has no {:?} field", name))
        })
    }

    /// Base key with the given field values filled in
    pub fn compose(&self, values: &[(KeyField, u32)]) -> ConnectivityResult<u32> {
        let mut key = self.base().key;
        for &(name, value) in values {
            let field = self.require(name)?;
            let placed = field.place(value).ok_or_else(|| {
                ConnectivityError::InvalidGeometry(format!(
                    "value {} does not fit the {}-bit {:?} field",
                    value, field.width, name
                ))
            })?;
            key |= placed;
        }
        Ok(key)
    }

    /// Union of the named field masks
    pub fn mask_of(&self, names: &[KeyField]) -> ConnectivityResult<u32> {
        names.iter().try_fold(0u32, |mask, &name| -> ConnectivityResult<u32> {
            Ok(mask | self.require(name)?.mask())
        })
    }

    pub fn extract(&self, key: u32, name: KeyField) -> Option<u32> {
        self.field(name).map(|field| field.extract(key))
    }
}
