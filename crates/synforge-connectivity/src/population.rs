// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Population and slice views consumed by connectors.

Shapes list the most rapidly varying dimension first, so a 2D population
has shape `(width, height)` and atom `(x, y)` has raster index `x + y * width`.
*/

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::{ConnectivityError, ConnectivityResult};

/// Population identifier
pub type PopulationId = u32;

/// Group of neurons addressed by connectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub id: PopulationId,
    pub label: String,
    pub shape: Vec<u32>,
    pub receptor_types: Vec<String>,
}

impl Population {
    pub fn new(
        id: PopulationId,
        label: impl Into<String>,
        shape: Vec<u32>,
        receptor_types: &[&str],
    ) -> ConnectivityResult<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "population shape {:?} must have at least one non-zero dimension",
                shape
            )));
        }
        Ok(Self {
            id,
            label: label.into(),
            shape,
            receptor_types: receptor_types.iter().map(|r| r.to_string()).collect(),
        })
    }

    pub fn n_atoms(&self) -> u32 {
        self.shape.iter().product()
    }

    pub fn n_dims(&self) -> usize {
        self.shape.len()
    }

    /// Synapse type index of the named receptor, if the population has it
    pub fn synapse_id_for(&self, target: &str) -> Option<u8> {
        self.receptor_types
            .iter()
            .position(|r| r == target)
            .and_then(|index| u8::try_from(index).ok())
    }

    /// Like [`Population::synapse_id_for`] but failing with `MissingReceptorType`
    pub fn require_synapse_id(&self, target: &str) -> ConnectivityResult<u8> {
        self.synapse_id_for(target)
            .ok_or_else(|| ConnectivityError::MissingReceptorType {
                receptor: target.to_string(),
                population: self.label.clone(),
            })
    }
}

/// Contiguous range of atoms placed on one core, with its per-dimension window
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexSlice {
    pub lo_atom: u32,
    pub hi_atom: u32,
    pub shape: Vec<u32>,
    pub start: Vec<u32>,
}

impl VertexSlice {
    /// One-dimensional slice covering `lo_atom..=hi_atom`
    pub fn linear(lo_atom: u32, hi_atom: u32) -> ConnectivityResult<Self> {
        if hi_atom < lo_atom {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "slice upper atom {} below lower atom {}",
                hi_atom, lo_atom
            )));
        }
        Ok(Self {
            lo_atom,
            hi_atom,
            shape: vec![hi_atom - lo_atom + 1],
            start: vec![lo_atom],
        })
    }

    /// Multi-dimensional slice; `hi_atom` follows from the shape
    pub fn with_shape(lo_atom: u32, shape: Vec<u32>, start: Vec<u32>) -> ConnectivityResult<Self> {
        if shape.is_empty() || shape.len() != start.len() || shape.contains(&0) {
            return Err(ConnectivityError::InvalidGeometry(format!(
                "slice shape {:?} and start {:?} are inconsistent",
                shape, start
            )));
        }
        let n_atoms: u32 = shape.iter().product();
        Ok(Self {
            lo_atom,
            hi_atom: lo_atom + n_atoms - 1,
            shape,
            start,
        })
    }

    /// Slice covering a whole population
    pub fn whole(population: &Population) -> Self {
        Self {
            lo_atom: 0,
            hi_atom: population.n_atoms() - 1,
            shape: population.shape.clone(),
            start: vec![0; population.n_dims()],
        }
    }

    pub fn n_atoms(&self) -> u32 {
        self.hi_atom - self.lo_atom + 1
    }

    /// Coordinate range covered in one dimension
    pub fn get_slice(&self, dim: usize) -> Range<u32> {
        match (self.start.get(dim), self.shape.get(dim)) {
            (Some(&start), Some(&size)) => start..start + size,
            _ => 0..1,
        }
    }

    fn is_linear_in(&self, population_shape: &[u32]) -> bool {
        self.shape.len() == 1 || self.shape.len() != population_shape.len()
    }

    /// Does the slice hold the atom with this population raster index?
    pub fn contains_raster(&self, raster: u32, population_shape: &[u32]) -> bool {
        if self.is_linear_in(population_shape) {
            return (self.lo_atom..=self.hi_atom).contains(&raster);
        }
        let mut remaining = raster;
        for (dim, &size) in population_shape.iter().enumerate() {
            let coord = remaining % size;
            remaining /= size;
            if !self.get_slice(dim).contains(&coord) {
                return false;
            }
        }
        remaining == 0
    }

    /// Population raster indices of the atoms in slice order (dimension 0 fastest)
    pub fn raster_atoms(&self, population_shape: &[u32]) -> Vec<u32> {
        if self.is_linear_in(population_shape) {
            return (self.lo_atom..=self.hi_atom).collect();
        }
        let mut atoms = Vec::with_capacity(self.n_atoms() as usize);
        let mut coords = self.start.clone();
        for _ in 0..self.n_atoms() {
            let mut raster = 0;
            let mut stride = 1;
            for (dim, &size) in population_shape.iter().enumerate() {
                raster += coords[dim] * stride;
                stride *= size;
            }
            atoms.push(raster);

            for dim in 0..coords.len() {
                coords[dim] += 1;
                if coords[dim] < self.start[dim] + self.shape[dim] {
                    break;
                }
                coords[dim] = self.start[dim];
            }
        }
        atoms
    }
}
