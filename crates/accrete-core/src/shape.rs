//! Problem shape: destination `[outer, var_axis, inner]`, updates `[outer, N, inner]`

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexAddShape {
    pub outer: usize,
    pub var_axis: usize,
    pub inner: usize,
    /// Number of indices `N`
    pub num_indices: usize,
}

impl IndexAddShape {
    #[inline]
    #[must_use]
    pub const fn new(outer: usize, var_axis: usize, inner: usize, num_indices: usize) -> Self {
        Self {
            outer,
            var_axis,
            inner,
            num_indices,
        }
    }

    /// Shape with a single outer slice: destination `[var_axis, inner]`
    #[inline]
    #[must_use]
    pub const fn rows(var_axis: usize, inner: usize, num_indices: usize) -> Self {
        Self::new(1, var_axis, inner, num_indices)
    }

    /// Collapse full array dimensions around `axis`.
    ///
    /// `dest_dims` and `updates_dims` must agree everywhere except at `axis`, where the
    /// updates carry one entry per index.
    pub fn from_dims(dest_dims: &[usize], updates_dims: &[usize], axis: usize) -> Result<Self> {
        if axis >= dest_dims.len() {
            return Err(Error::invalid_argument(
                "dim",
                format!("axis {axis} out of range for {} dimensions", dest_dims.len()),
            ));
        }
        if dest_dims.len() != updates_dims.len() {
            return Err(Error::ShapeMismatch {
                what: "source ndim",
                expected: dest_dims.len(),
                got: updates_dims.len(),
            });
        }
        for (d, (&a, &b)) in dest_dims.iter().zip(updates_dims).enumerate() {
            if d != axis && a != b {
                return Err(Error::ShapeMismatch {
                    what: "source dimension",
                    expected: a,
                    got: b,
                });
            }
        }
        let outer = checked_product(&dest_dims[..axis])?;
        let inner = checked_product(&dest_dims[axis + 1..])?;
        Ok(Self::new(outer, dest_dims[axis], inner, updates_dims[axis]))
    }

    /// Destination rows `outer * var_axis`
    pub fn dest_rows(&self) -> Result<usize> {
        mul(self.outer, self.var_axis)
    }

    pub fn dest_len(&self) -> Result<usize> {
        mul(self.dest_rows()?, self.inner)
    }

    /// Update rows `outer * N`
    pub fn update_rows(&self) -> Result<usize> {
        mul(self.outer, self.num_indices)
    }

    pub fn updates_len(&self) -> Result<usize> {
        mul(self.update_rows()?, self.inner)
    }

    /// Check buffer lengths against the shape.
    pub fn validate(&self, dest_len: usize, updates_len: usize, indices_len: usize) -> Result<()> {
        if indices_len != self.num_indices {
            return Err(Error::ShapeMismatch {
                what: "indices",
                expected: self.num_indices,
                got: indices_len,
            });
        }
        let expected = self.dest_len()?;
        if dest_len != expected {
            return Err(Error::ShapeMismatch {
                what: "dest",
                expected,
                got: dest_len,
            });
        }
        let expected = self.updates_len()?;
        if updates_len != expected {
            return Err(Error::ShapeMismatch {
                what: "updates",
                expected,
                got: updates_len,
            });
        }
        Ok(())
    }

    /// Flat destination row for key `k` in outer slice `o`
    #[inline]
    #[must_use]
    pub const fn dest_row(&self, o: usize, k: usize) -> usize {
        o * self.var_axis + k
    }

    /// Flat update row for index position `i` in outer slice `o`
    #[inline]
    #[must_use]
    pub const fn update_row(&self, o: usize, i: usize) -> usize {
        o * self.num_indices + i
    }

    /// `N / var_axis` below this ratio finishes by walking touched rows only
    #[inline]
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        const SPARSE_RATIO: usize = 10;
        self.num_indices.saturating_mul(SPARSE_RATIO) < self.var_axis
    }
}

#[inline]
fn mul(a: usize, b: usize) -> Result<usize> {
    a.checked_mul(b)
        .ok_or_else(|| Error::invalid_argument("shape", "element count overflows usize"))
}

fn checked_product(dims: &[usize]) -> Result<usize> {
    dims.iter().try_fold(1usize, |acc, &d| mul(acc, d))
}
