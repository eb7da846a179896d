//! Grouped reducer: one combined row per distinct destination key

use crate::sort::SortGroup;
use crate::util::RowAdd;

/// Dense combined rows, each tagged with its flat destination row.
#[derive(Debug, Clone, Default)]
pub struct GroupedRows<T> {
    pub rows: Vec<usize>,
    pub data: Vec<T>,
    pub width: usize,
}

impl<T> GroupedRows<T> {
    #[must_use]
    pub const fn new(width: usize) -> Self {
        Self {
            rows: Vec::new(),
            data: Vec::new(),
            width,
        }
    }

    /// Drop all rows and switch to `width` columns
    pub fn reset(&mut self, width: usize) {
        self.rows.clear();
        self.data.clear();
        self.width = width;
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(destination row, combined values)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[T])> + '_ {
        self.rows
            .iter()
            .copied()
            .zip(self.data.chunks_exact(self.width.max(1)))
    }
}

/// Sum the update rows of every valid run of `group` and append one row per run to `out`.
///
/// `row(p)` returns the `out.width` update values for chunk position `p`. Members of a
/// run are summed in ascending original position; a single-member run is a copy.
/// With `alpha` each row is scaled before it is summed. Destination rows are tagged
/// as `row_base + k`.
pub fn reduce_runs<'u, T, F>(
    group: &SortGroup,
    row_base: usize,
    alpha: Option<T>,
    row: F,
    out: &mut GroupedRows<T>,
) where
    T: RowAdd + 'u,
    F: Fn(usize) -> &'u [T],
{
    let width = out.width;
    for (k, members) in group.valid_runs() {
        let Some((&first, rest)) = members.split_first() else {
            continue;
        };
        out.rows.push(row_base + k);
        let at = out.data.len();
        match alpha {
            None => out.data.extend_from_slice(row(first)),
            Some(a) => out.data.extend(row(first).iter().map(|&x| a.mul(x))),
        }
        let acc = &mut out.data[at..at + width];
        for &p in rest {
            match alpha {
                None => T::add_row(acc, row(p)),
                Some(a) => T::add_scaled_row(acc, row(p), a),
            }
        }
    }
}
