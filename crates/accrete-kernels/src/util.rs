//! Row arithmetic and shared constants
//
// Row adds use separate multiply and add lanes (never fused) so the SIMD kernels give
// bit-identical results to the scalar tail and to each other.

use accrete_core::Element;
use wide::{f32x8, f64x4};

/// Index positions per chunk never go below this
pub const MIN_BLOCK_ROWS: usize = 128;
/// Upper bound on index positions per chunk
pub const MAX_BLOCK_ROWS: usize = 64 * 1024;
/// Scratch bytes per unit assumed when nothing better is known
pub const DEFAULT_SCRATCH_BYTES: usize = 192 * 1024;

/// Element-wise row accumulation, `acc += row` and `acc += alpha * row`.
pub trait RowAdd: Element {
    #[inline]
    fn add_row(acc: &mut [Self], row: &[Self]) {
        for (a, &x) in acc.iter_mut().zip(row) {
            *a = a.add(x);
        }
    }

    #[inline]
    fn add_scaled_row(acc: &mut [Self], row: &[Self], alpha: Self) {
        for (a, &x) in acc.iter_mut().zip(row) {
            *a = a.add(alpha.mul(x));
        }
    }
}

impl RowAdd for i32 {}
impl RowAdd for i64 {}

impl RowAdd for f64 {
    #[inline]
    fn add_row(acc: &mut [f64], row: &[f64]) {
        debug_assert_eq!(acc.len(), row.len());
        let mut ac = acc.chunks_exact_mut(4);
        let mut rc = row.chunks_exact(4);
        for (a, r) in (&mut ac).zip(&mut rc) {
            let v = f64x4::from([a[0], a[1], a[2], a[3]]) + f64x4::from([r[0], r[1], r[2], r[3]]);
            a.copy_from_slice(&v.to_array());
        }
        for (a, &x) in ac.into_remainder().iter_mut().zip(rc.remainder()) {
            *a += x;
        }
    }

    #[inline]
    fn add_scaled_row(acc: &mut [f64], row: &[f64], alpha: f64) {
        debug_assert_eq!(acc.len(), row.len());
        let av = f64x4::splat(alpha);
        let mut ac = acc.chunks_exact_mut(4);
        let mut rc = row.chunks_exact(4);
        for (a, r) in (&mut ac).zip(&mut rc) {
            let scaled = av * f64x4::from([r[0], r[1], r[2], r[3]]);
            let v = f64x4::from([a[0], a[1], a[2], a[3]]) + scaled;
            a.copy_from_slice(&v.to_array());
        }
        for (a, &x) in ac.into_remainder().iter_mut().zip(rc.remainder()) {
            *a += alpha * x;
        }
    }
}

impl RowAdd for f32 {
    #[inline]
    fn add_row(acc: &mut [f32], row: &[f32]) {
        debug_assert_eq!(acc.len(), row.len());
        let mut ac = acc.chunks_exact_mut(8);
        let mut rc = row.chunks_exact(8);
        for (a, r) in (&mut ac).zip(&mut rc) {
            let v = f32x8::from(lanes8(a)) + f32x8::from(lanes8(r));
            a.copy_from_slice(&v.to_array());
        }
        for (a, &x) in ac.into_remainder().iter_mut().zip(rc.remainder()) {
            *a += x;
        }
    }

    #[inline]
    fn add_scaled_row(acc: &mut [f32], row: &[f32], alpha: f32) {
        debug_assert_eq!(acc.len(), row.len());
        let av = f32x8::splat(alpha);
        let mut ac = acc.chunks_exact_mut(8);
        let mut rc = row.chunks_exact(8);
        for (a, r) in (&mut ac).zip(&mut rc) {
            let scaled = av * f32x8::from(lanes8(r));
            let v = f32x8::from(lanes8(a)) + scaled;
            a.copy_from_slice(&v.to_array());
        }
        for (a, &x) in ac.into_remainder().iter_mut().zip(rc.remainder()) {
            *a += alpha * x;
        }
    }
}

#[inline]
fn lanes8(s: &[f32]) -> [f32; 8] {
    let mut out = [0.0f32; 8];
    out.copy_from_slice(s);
    out
}

/// Number of 8-bit radix passes needed to order keys up to `max_key`.
#[inline]
#[must_use]
pub const fn radix_passes(max_key: u64) -> u32 {
    (u64::BITS - max_key.leading_zeros()).div_ceil(8)
}

#[inline]
#[must_use]
pub fn usize_to_u64(x: usize) -> u64 {
    #[allow(clippy::cast_possible_truncation, reason = "usize is at most 64 bits wide")]
    {
        x as u64
    }
}

#[inline]
#[must_use]
pub fn u64_to_usize(x: u64) -> usize {
    debug_assert!(usize::try_from(x).is_ok());
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Callers pass mapped keys bounded by a usize extent"
    )]
    {
        x as usize
    }
}

#[inline]
#[must_use]
pub fn usize_to_f64(x: usize) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "Used for ratios where rounding is harmless")]
    {
        x as f64
    }
}
