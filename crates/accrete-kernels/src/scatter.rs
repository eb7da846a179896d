//! Direct scatter: concurrent atomic adds into the destination

use std::ops::Range;

use accrete_core::index::resolve;
use accrete_core::{Element, IndexAddShape, IndexValue, Indices};

use crate::group::GroupedRows;

/// A destination shared by all units, restricted to a column range.
pub struct ScatterTarget<'a, T: Element> {
    cells: &'a [T::Atomic],
    shape: IndexAddShape,
    cols: Range<usize>,
}

impl<'a, T: Element> ScatterTarget<'a, T> {
    /// `cells` must hold `shape.dest_len()` elements
    #[must_use]
    pub fn new(cells: &'a [T::Atomic], shape: IndexAddShape) -> Self {
        debug_assert!(shape.dest_len().is_ok_and(|n| n == cells.len()));
        Self {
            cells,
            shape,
            cols: 0..shape.inner,
        }
    }

    /// Same destination, columns `cols` only
    #[must_use]
    pub fn with_cols(&self, cols: Range<usize>) -> Self {
        Self {
            cells: self.cells,
            shape: self.shape,
            cols,
        }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.cols.len()
    }

    #[inline]
    fn row_cells(&self, dest_row: usize) -> &'a [T::Atomic] {
        let base = dest_row * self.shape.inner;
        &self.cells[base + self.cols.start..base + self.cols.end]
    }

    /// Add `alpha * row` into flat destination row `dest_row`.
    #[inline]
    pub fn add_row(&self, dest_row: usize, row: &[T], alpha: Option<T>) {
        let cells = self.row_cells(dest_row);
        match alpha {
            None => {
                for (c, &x) in cells.iter().zip(row) {
                    T::atomic_add(c, x);
                }
            }
            Some(a) => {
                for (c, &x) in cells.iter().zip(row) {
                    T::atomic_add(c, a.mul(x));
                }
            }
        }
    }

    /// Direct path over one chunk: positions `start..start + indices.len()` of every
    /// outer slice in `outer`, in index order. Out-of-range keys are skipped.
    pub fn scatter_chunk<I: IndexValue>(
        &self,
        outer: Range<usize>,
        start: usize,
        indices: Indices<'_, I>,
        updates: &[T],
        alpha: Option<T>,
    ) {
        let inner = self.shape.inner;
        for o in outer {
            for (p, key) in indices.iter().enumerate() {
                let Some(k) = resolve(key, self.shape.var_axis) else {
                    continue;
                };
                let base = self.shape.update_row(o, start + p) * inner;
                let row = &updates[base + self.cols.start..base + self.cols.end];
                self.add_row(self.shape.dest_row(o, k), row, alpha);
            }
        }
    }

    /// Add every combined row of `grouped`; any scaling is already applied.
    pub fn add_grouped(&self, grouped: &GroupedRows<T>) {
        for (r, vals) in grouped.iter() {
            self.add_row(r, vals, None);
        }
    }
}

/// Whole-problem direct scatter on the calling thread.
pub fn scatter_add<T: Element, I: IndexValue>(
    dest: &mut [T],
    shape: &IndexAddShape,
    indices: Indices<'_, I>,
    updates: &[T],
    alpha: Option<T>,
) -> accrete_core::Result<()> {
    shape.validate(dest.len(), updates.len(), indices.len())?;
    let target = ScatterTarget::<T>::new(T::as_atomic(dest), *shape);
    target.scatter_chunk(0..shape.outer, 0, indices, updates, alpha);
    Ok(())
}
