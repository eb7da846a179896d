//! Collision estimator: a bucket histogram over an index chunk

use accrete_core::{EngineConfig, IndexValue, Indices};

use crate::util::{u64_to_usize, usize_to_f64, usize_to_u64};

/// Accumulation path chosen for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkPath {
    /// Add rows straight into the destination
    Direct,
    /// Sort, group duplicate keys and add one combined row per key
    SortGroup,
}

/// Duplicate density of `indices` in `[0, 1]`.
///
/// Keys are bucketed by `key mod buckets`; the score is the excess of the fullest
/// bucket over a single entry, relative to the chunk length. A chunk of distinct
/// consecutive keys scores below `1 / buckets`, a chunk of one repeated key scores
/// `(m - 1) / m`.
#[must_use]
pub fn collision_score<I: IndexValue>(indices: Indices<'_, I>, buckets: usize) -> f64 {
    let m = indices.len();
    if m == 0 || buckets == 0 {
        return 0.0;
    }
    let mut hist = vec![0usize; buckets];
    let b = i64::try_from(usize_to_u64(buckets)).unwrap_or(i64::MAX);
    for key in indices.iter() {
        #[allow(clippy::cast_sign_loss, reason = "rem_euclid with a positive modulus is non-negative")]
        let slot = u64_to_usize(key.rem_euclid(b) as u64);
        hist[slot] += 1;
    }
    let max_bucket = hist.iter().copied().max().unwrap_or(0);
    usize_to_f64(max_bucket.saturating_sub(1)) / usize_to_f64(m)
}

/// Pick the path for one chunk.
#[must_use]
pub fn choose_path<I: IndexValue>(indices: Indices<'_, I>, cfg: &EngineConfig) -> ChunkPath {
    if indices.len() < cfg.sort_min_rows {
        return ChunkPath::Direct;
    }
    let score = collision_score(indices, cfg.histogram_buckets);
    let path = if score > cfg.collision_threshold {
        ChunkPath::SortGroup
    } else {
        ChunkPath::Direct
    };
    log::trace!("collision score {score:.4} over {} rows -> {path:?}", indices.len());
    path
}
