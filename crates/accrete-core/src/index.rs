//! Index streams: `i32`/`i64` keys, optionally strided

use std::fmt::Debug;

use crate::error::{Error, Result};

/// An index key type
pub trait IndexValue: Copy + Send + Sync + Debug + 'static {
    fn to_i64(self) -> i64;
}

impl IndexValue for i32 {
    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }
}

impl IndexValue for i64 {
    #[inline]
    fn to_i64(self) -> i64 {
        self
    }
}

/// Map a raw key to a row of an axis of length `var_axis`, or `None` when out of range.
#[inline]
#[must_use]
pub fn resolve(key: i64, var_axis: usize) -> Option<usize> {
    usize::try_from(key).ok().filter(|&k| k < var_axis)
}

/// Read-only view over `len` keys, key `i` living at `data[i * stride]`.
#[derive(Debug, Clone, Copy)]
pub struct Indices<'a, I> {
    data: &'a [I],
    len: usize,
    stride: usize,
}

impl<'a, I: IndexValue> Indices<'a, I> {
    #[inline]
    #[must_use]
    pub const fn contiguous(data: &'a [I]) -> Self {
        Self {
            data,
            len: data.len(),
            stride: 1,
        }
    }

    /// Build a strided view; the backing slice must reach the last key.
    pub fn strided(data: &'a [I], len: usize, stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(Error::invalid_argument("stride", "must be at least 1"));
        }
        if len > 0 {
            let last = (len - 1)
                .checked_mul(stride)
                .ok_or_else(|| Error::invalid_argument("stride", "len * stride overflows"))?;
            if last >= data.len() {
                return Err(Error::ShapeMismatch {
                    what: "strided indices backing slice",
                    expected: last + 1,
                    got: data.len(),
                });
            }
        }
        Ok(Self { data, len, stride })
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Raw key at logical position `i`
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> i64 {
        self.data[i * self.stride].to_i64()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Sub-view over logical positions `start..end`
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len);
        if start >= end {
            return Self {
                data: &[],
                len: 0,
                stride: self.stride,
            };
        }
        Self {
            data: &self.data[start * self.stride..],
            len: end - start,
            stride: self.stride,
        }
    }
}
