//! Element types the engine accumulates into

use std::fmt::Debug;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};

/// Runtime tag for an [`Element`] type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
}

impl DType {
    /// Width of one element in bytes
    #[inline]
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    /// Whether addition over this type is non-associative
    #[inline]
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

/// A destination element.
///
/// Every element type has a same-sized atomic twin so a `&mut [Self]` destination can
/// be shared across rayon workers as `&[Self::Atomic]` for concurrent adds. Integer
/// arithmetic wraps, matching the behavior of a hardware atomic add.
pub trait Element: Copy + Send + Sync + PartialEq + Debug + Default + 'static {
    /// Atomic cell with the same size and alignment as `Self`
    type Atomic: Send + Sync;

    const DTYPE: DType;
    const ZERO: Self;
    const ONE: Self;

    fn add(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn to_f64(self) -> f64;
    /// Convert back from `f64`; integers round half to even and saturate
    fn from_f64(v: f64) -> Self;

    /// Reinterpret an exclusively borrowed slice as atomic cells
    fn as_atomic(slice: &mut [Self]) -> &[Self::Atomic];
    fn atomic_add(cell: &Self::Atomic, v: Self);
    fn atomic_load(cell: &Self::Atomic) -> Self;
}

macro_rules! impl_float_element {
    ($t:ty, $atomic:ty, $dtype:expr) => {
        const _: () = assert!(std::mem::size_of::<$t>() == std::mem::size_of::<$atomic>());
        const _: () = assert!(std::mem::align_of::<$t>() == std::mem::align_of::<$atomic>());

        impl Element for $t {
            type Atomic = $atomic;

            const DTYPE: DType = $dtype;
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                self + rhs
            }

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }

            #[inline]
            #[allow(clippy::cast_lossless, reason = "f32 widens to f64 exactly")]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Narrowing to the destination precision is intended"
            )]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn as_atomic(slice: &mut [Self]) -> &[Self::Atomic] {
                // SAFETY: size and alignment are asserted equal above, the exclusive
                // borrow guarantees no non-atomic access for the returned lifetime, and
                // every bit pattern of the float is a valid integer.
                unsafe { &*(std::ptr::from_mut::<[Self]>(slice) as *const [Self::Atomic]) }
            }

            #[inline]
            fn atomic_add(cell: &Self::Atomic, v: Self) {
                let mut cur = cell.load(Ordering::Relaxed);
                loop {
                    let next = (<$t>::from_bits(cur) + v).to_bits();
                    match cell.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                        Ok(_) => return,
                        Err(actual) => cur = actual,
                    }
                }
            }

            #[inline]
            fn atomic_load(cell: &Self::Atomic) -> Self {
                <$t>::from_bits(cell.load(Ordering::Relaxed))
            }
        }
    };
}

macro_rules! impl_int_element {
    ($t:ty, $atomic:ty, $dtype:expr) => {
        const _: () = assert!(std::mem::size_of::<$t>() == std::mem::size_of::<$atomic>());
        const _: () = assert!(std::mem::align_of::<$t>() == std::mem::align_of::<$atomic>());

        impl Element for $t {
            type Atomic = $atomic;

            const DTYPE: DType = $dtype;
            const ZERO: Self = 0;
            const ONE: Self = 1;

            #[inline]
            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            #[inline]
            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }

            #[inline]
            #[allow(clippy::cast_precision_loss, reason = "Only used for tolerances and reporting")]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Float to int casts saturate in Rust"
            )]
            fn from_f64(v: f64) -> Self {
                v.round_ties_even() as $t
            }

            #[inline]
            fn as_atomic(slice: &mut [Self]) -> &[Self::Atomic] {
                // SAFETY: size and alignment are asserted equal above and the exclusive
                // borrow guarantees no non-atomic access for the returned lifetime.
                unsafe { &*(std::ptr::from_mut::<[Self]>(slice) as *const [Self::Atomic]) }
            }

            #[inline]
            fn atomic_add(cell: &Self::Atomic, v: Self) {
                cell.fetch_add(v, Ordering::Relaxed);
            }

            #[inline]
            fn atomic_load(cell: &Self::Atomic) -> Self {
                cell.load(Ordering::Relaxed)
            }
        }
    };
}

impl_float_element!(f32, AtomicU32, DType::F32);
impl_float_element!(f64, AtomicU64, DType::F64);
impl_int_element!(i32, AtomicI32, DType::I32);
impl_int_element!(i64, AtomicI64, DType::I64);
