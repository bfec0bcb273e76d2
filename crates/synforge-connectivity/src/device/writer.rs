// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Fixed-size little-endian region writer.

The region is allocated at its final size up front. Writing past the end, or
finishing before the end, is a [`ConnectivityError::RegionSizeMismatch`]; a
region is only ever handed out complete.
*/

use byteorder::{ByteOrder, LittleEndian};

use crate::types::{ConnectivityError, ConnectivityResult};

pub const BYTES_PER_WORD: usize = 4;
pub const BYTES_PER_SHORT: usize = 2;

/// Round a byte count up to whole words
pub fn pad_to_word(n_bytes: usize) -> usize {
    n_bytes.div_ceil(BYTES_PER_WORD) * BYTES_PER_WORD
}

#[derive(Debug, Clone)]
pub struct RegionWriter {
    bytes: Vec<u8>,
    cursor: usize,
}

impl RegionWriter {
    pub fn with_size(n_bytes: usize) -> Self {
        Self {
            bytes: vec![0; n_bytes],
            cursor: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn reserve(&mut self, n_bytes: usize) -> ConnectivityResult<&mut [u8]> {
        let end = self.cursor + n_bytes;
        if end > self.bytes.len() {
            return Err(ConnectivityError::RegionSizeMismatch {
                expected: self.bytes.len(),
                actual: end,
            });
        }
        let start = self.cursor;
        self.cursor = end;
        Ok(&mut self.bytes[start..end])
    }

    pub fn write_u32(&mut self, value: u32) -> ConnectivityResult<()> {
        LittleEndian::write_u32(self.reserve(BYTES_PER_WORD)?, value);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> ConnectivityResult<()> {
        LittleEndian::write_u16(self.reserve(BYTES_PER_SHORT)?, value);
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> ConnectivityResult<()> {
        LittleEndian::write_i16(self.reserve(BYTES_PER_SHORT)?, value);
        Ok(())
    }

    /// Two 16-bit fields in one word; the first lands in the low half
    pub fn write_short_pair(&mut self, low: u16, high: u16) -> ConnectivityResult<()> {
        self.write_u32(u32::from(low) | (u32::from(high) << 16))
    }

    pub fn write_words(&mut self, values: &[u32]) -> ConnectivityResult<()> {
        LittleEndian::write_u32_into(values, self.reserve(values.len() * BYTES_PER_WORD)?);
        Ok(())
    }

    pub fn write_i16s(&mut self, values: &[i16]) -> ConnectivityResult<()> {
        LittleEndian::write_i16_into(values, self.reserve(values.len() * BYTES_PER_SHORT)?);
        Ok(())
    }

    /// Zero-fill up to the next word boundary
    pub fn align_to_word(&mut self) -> ConnectivityResult<()> {
        let padding = pad_to_word(self.cursor) - self.cursor;
        self.reserve(padding).map(|_| ())
    }

    /// The completed region; fails unless every reserved byte was written
    pub fn finish(self) -> ConnectivityResult<Vec<u8>> {
        if self.cursor != self.bytes.len() {
            return Err(ConnectivityError::RegionSizeMismatch {
                expected: self.bytes.len(),
                actual: self.cursor,
            });
        }
        Ok(self.bytes)
    }
}
