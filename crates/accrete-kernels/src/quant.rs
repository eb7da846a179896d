//! Deterministic quantized accumulator
//
// Stage 1 folds |partial| into a per-element reference (exact max over the f64 bit
// pattern, which orders like the value for non-negative floats) and counts partials
// per destination row. Stage 2 turns every partial into a fixed-point integer relative
// to R = reference * count and adds it exactly. Stage 3 converts back and applies
// the single final add per touched row. Every stage finishes for all partials before
// the next starts.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use accrete_core::{Element, Error, IndexAddShape, Result};
use rayon::prelude::*;

use crate::group::GroupedRows;

/// Caller-owned scratch of the quantized path, indexed by destination element/row.
#[derive(Debug)]
pub struct QuantWorkspace {
    reference: Vec<AtomicU64>,
    acc: Vec<AtomicI64>,
    counts: Vec<AtomicU32>,
}

impl QuantWorkspace {
    /// Workspace sized for `shape`
    pub fn new(shape: &IndexAddShape) -> Result<Self> {
        Ok(Self::with_capacity(shape.dest_rows()?, shape.dest_len()?))
    }

    #[must_use]
    pub fn with_capacity(rows: usize, elements: usize) -> Self {
        Self {
            reference: (0..elements).map(|_| AtomicU64::new(0)).collect(),
            acc: (0..elements).map(|_| AtomicI64::new(0)).collect(),
            counts: (0..rows).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    #[must_use]
    pub fn elements(&self) -> usize {
        self.acc.len()
    }

    /// Fail unless the workspace can hold `shape`
    pub fn check(&self, shape: &IndexAddShape) -> Result<()> {
        let rows = shape.dest_rows()?;
        if self.rows() < rows {
            return Err(Error::WorkspaceTooSmall {
                what: "row counters",
                required: rows,
                available: self.rows(),
            });
        }
        let elements = shape.dest_len()?;
        if self.elements() < elements {
            return Err(Error::WorkspaceTooSmall {
                what: "element accumulators",
                required: elements,
                available: self.elements(),
            });
        }
        Ok(())
    }

    /// Zero every slot
    pub fn reset(&mut self) {
        self.reference
            .par_iter_mut()
            .for_each(|r| *r.get_mut() = 0);
        self.acc.par_iter_mut().for_each(|a| *a.get_mut() = 0);
        self.counts.par_iter_mut().for_each(|c| *c.get_mut() = 0);
    }

    /// Contribution count of flat destination row `row`
    #[must_use]
    pub fn count(&self, row: usize) -> u32 {
        self.counts[row].load(Ordering::Relaxed)
    }

    /// Stage 1: publish magnitudes and counts of one partition's grouped partials.
    pub fn observe<T: Element>(&self, partials: &GroupedRows<T>, inner: usize) {
        for (row, vals) in partials.iter() {
            self.counts[row].fetch_add(1, Ordering::Relaxed);
            let base = row * inner;
            for (r, &v) in self.reference[base..base + inner].iter().zip(vals) {
                r.fetch_max(v.to_f64().abs().to_bits(), Ordering::Relaxed);
            }
        }
    }

    /// Stage 2: quantize one partition's partials against the published references.
    pub fn quantize<T: Element>(&self, partials: &GroupedRows<T>, inner: usize, scale: f64) {
        for (row, vals) in partials.iter() {
            let count = f64::from(self.counts[row].load(Ordering::Relaxed));
            let base = row * inner;
            for (j, &v) in vals.iter().enumerate() {
                let r = self.range(base + j, count);
                self.acc[base + j].fetch_add(to_fixed(v.to_f64() / r * scale), Ordering::Relaxed);
            }
        }
    }

    /// Stage 3 for one row: the reconstructed sum of all partials, times `alpha`.
    fn dequantize_row(&self, row: usize, inner: usize, scale: f64, alpha: f64, out: &mut [f64]) {
        let count = f64::from(self.counts[row].load(Ordering::Relaxed));
        let base = row * inner;
        for (j, o) in out.iter_mut().enumerate() {
            let r = self.range(base + j, count);
            #[allow(clippy::cast_precision_loss, reason = "Accumulated magnitude stays near the scale")]
            let q = self.acc[base + j].load(Ordering::Relaxed) as f64;
            *o = q / scale * r * alpha;
        }
    }

    #[inline]
    fn range(&self, element: usize, count: f64) -> f64 {
        let r = f64::from_bits(self.reference[element].load(Ordering::Relaxed)) * count;
        if r == 0.0 {
            1.0
        } else {
            r
        }
    }
}

/// Round half to even, saturating at the `i64` range.
#[inline]
fn to_fixed(x: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation, reason = "Float to int casts saturate")]
    {
        x.round_ties_even() as i64
    }
}

/// Fixed-point scale `2^bits`
#[inline]
#[must_use]
pub fn scale_for(bits: u32) -> f64 {
    f64::from(1u32 << bits.min(31)) * f64::from(1u32 << bits.saturating_sub(31))
}

/// Run stages 2 and 3 over the partials collected in stage 1 and add the results into
/// `dest`. Rows are finished by walking the touched rows when `sparse`, otherwise by
/// sweeping every destination row.
pub fn finish<T: Element>(
    ws: &QuantWorkspace,
    partials: &[GroupedRows<T>],
    dest: &mut [T],
    shape: &IndexAddShape,
    scale_bits: u32,
    alpha: Option<T>,
    sparse: bool,
) {
    let inner = shape.inner;
    let scale = scale_for(scale_bits);
    partials.par_iter().for_each(|p| ws.quantize(p, inner, scale));

    let alpha = alpha.map_or(1.0, Element::to_f64);
    if sparse {
        let mut touched: Vec<usize> = partials.iter().flat_map(|p| p.rows.iter().copied()).collect();
        touched.par_sort_unstable();
        touched.dedup();
        let cells = T::as_atomic(dest);
        touched.par_iter().for_each_init(
            || vec![0.0f64; inner],
            |buf, &row| {
                ws.dequantize_row(row, inner, scale, alpha, buf);
                let base = row * inner;
                // Each touched row appears once, so these adds never contend.
                for (c, &v) in cells[base..base + inner].iter().zip(buf.iter()) {
                    T::atomic_add(c, T::from_f64(v));
                }
            },
        );
    } else {
        dest.par_chunks_mut(inner.max(1))
            .enumerate()
            .for_each_init(
                || vec![0.0f64; inner],
                |buf, (row, out)| {
                    if ws.count(row) == 0 {
                        return;
                    }
                    ws.dequantize_row(row, inner, scale, alpha, buf);
                    for (d, &v) in out.iter_mut().zip(buf.iter()) {
                        *d = d.add(T::from_f64(v));
                    }
                },
            );
    }
}
