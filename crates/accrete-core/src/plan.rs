//! Execution plans: which axis is split across units and how large the chunks are

use std::ops::Range;

use crate::error::{Error, Result};
use crate::shape::IndexAddShape;

/// The axis whose extent is divided among execution units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardAxis {
    /// Each unit owns whole outer slices
    Outer,
    /// Each unit owns a contiguous range of index positions
    Index,
    /// Each unit owns a column range of the inner extent
    Inner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub axis: ShardAxis,
    /// Logical execution units
    pub units: usize,
    /// Index rows per estimator/sort chunk
    pub block_rows: usize,
    /// Columns per unit when sharding the inner axis
    pub inner_chunk: usize,
}

impl Plan {
    #[inline]
    #[must_use]
    pub const fn new(axis: ShardAxis, units: usize, block_rows: usize, inner_chunk: usize) -> Self {
        Self {
            axis,
            units,
            block_rows,
            inner_chunk,
        }
    }

    /// Same plan, different unit count
    #[inline]
    #[must_use]
    pub const fn with_units(mut self, units: usize) -> Self {
        self.units = units;
        self
    }

    pub fn validate(&self, shape: &IndexAddShape) -> Result<()> {
        if self.units == 0 {
            return Err(invalid("units must be at least 1"));
        }
        if self.block_rows == 0 {
            return Err(invalid("block_rows must be at least 1"));
        }
        if self.axis == ShardAxis::Inner && shape.inner > 0 {
            if self.inner_chunk == 0 {
                return Err(invalid("inner_chunk must be at least 1 when sharding the inner axis"));
            }
            if self.inner_chunk.saturating_mul(self.units) < shape.inner {
                return Err(invalid("inner_chunk * units must cover the inner extent"));
            }
        }
        Ok(())
    }

    /// Number of `block_rows` chunks covering `n` items
    #[inline]
    #[must_use]
    pub const fn num_blocks(&self, n: usize) -> usize {
        n.div_ceil(self.block_rows)
    }

    /// Columns owned by `unit` when sharding the inner axis
    #[must_use]
    pub fn inner_cols(&self, unit: usize, inner: usize) -> Range<usize> {
        let start = unit.saturating_mul(self.inner_chunk).min(inner);
        let end = start.saturating_add(self.inner_chunk).min(inner);
        start..end
    }

    /// Items `total` split into `units` contiguous ranges; trailing units may be empty.
    #[must_use]
    pub fn unit_range(&self, unit: usize, total: usize) -> Range<usize> {
        let per = total.div_ceil(self.units.max(1));
        let start = (unit * per).min(total);
        let end = (start + per).min(total);
        start..end
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidPlan {
        reason: reason.to_string(),
    }
}
