//! Sort-and-group: stable radix sort of an index chunk and its run-length table
//
// Keys are mapped before sorting so invalid entries collect at the two ends:
// negative -> 0, valid k -> k + 1, k >= var_axis -> var_axis + 1.

use accrete_core::{EngineConfig, IndexValue, Indices};
use rayon::prelude::*;

use crate::util::{radix_passes, u64_to_usize, usize_to_u64};

const SENTINEL: u64 = u64::MAX;
const RADIX: usize = 256;

/// One run of equal keys in sorted order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Mapped key shared by the run
    pub key: u64,
    /// Offset of the first member in sorted order
    pub start: usize,
    /// Number of members
    pub count: usize,
}

impl Run {
    /// Destination row of this run, `None` for the invalid runs at either end.
    #[inline]
    #[must_use]
    pub fn dest_row(&self, var_axis: usize) -> Option<usize> {
        let k = u64_to_usize(self.key.checked_sub(1)?);
        (k < var_axis).then_some(k)
    }
}

/// Sorted keys, origin permutation and run table of one chunk.
#[derive(Debug, Clone, Default)]
pub struct SortGroup {
    /// Mapped keys with a sentinel at each end
    padded: Vec<u64>,
    /// For every sorted rank, the original chunk position
    origin: Vec<usize>,
    /// Run starts in padded coordinates, the last entry closing the final run
    starts: Vec<usize>,
    runs: Vec<Run>,
    var_axis: usize,
}

/// Buffers the radix passes ping-pong through
#[derive(Debug, Default)]
pub struct SortScratch {
    keys: Vec<u64>,
    tmp_keys: Vec<u64>,
    tmp_origin: Vec<usize>,
}

impl SortGroup {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.origin.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origin.is_empty()
    }

    /// Mapped keys in ascending order
    #[must_use]
    pub fn sorted_keys(&self) -> &[u64] {
        match self.padded.len() {
            0 => &[],
            n => &self.padded[1..n - 1],
        }
    }

    #[must_use]
    pub fn origin(&self) -> &[usize] {
        &self.origin
    }

    /// Every run, including those of invalid keys
    #[must_use]
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Runs of valid keys as `(destination row, original positions in ascending order)`
    pub fn valid_runs(&self) -> impl Iterator<Item = (usize, &[usize])> + '_ {
        self.runs.iter().filter_map(move |r| {
            r.dest_row(self.var_axis)
                .map(|k| (k, &self.origin[r.start..r.start + r.count]))
        })
    }

    /// Number of distinct valid keys
    #[must_use]
    pub fn unique_valid(&self) -> usize {
        self.valid_runs().count()
    }

    fn clear(&mut self) {
        self.padded.clear();
        self.origin.clear();
        self.starts.clear();
        self.runs.clear();
    }
}

#[inline]
fn map_key(key: i64, var_axis: u64) -> u64 {
    match u64::try_from(key) {
        Err(_) => 0,
        Ok(k) if k < var_axis => k + 1,
        Ok(_) => var_axis.saturating_add(1),
    }
}

/// Sort and group `indices` into a fresh table.
#[must_use]
pub fn sort_and_group<I: IndexValue>(
    indices: Indices<'_, I>,
    var_axis: usize,
    cfg: &EngineConfig,
) -> SortGroup {
    let mut out = SortGroup::default();
    let mut scratch = SortScratch::default();
    sort_and_group_into(indices, var_axis, cfg, &mut scratch, &mut out);
    out
}

/// Sort and group `indices`, reusing the buffers of `out` and `scratch`.
pub fn sort_and_group_into<I: IndexValue>(
    indices: Indices<'_, I>,
    var_axis: usize,
    cfg: &EngineConfig,
    scratch: &mut SortScratch,
    out: &mut SortGroup,
) {
    out.clear();
    out.var_axis = var_axis;
    let m = indices.len();
    if m == 0 {
        return;
    }
    let var = usize_to_u64(var_axis);

    let mut keys = std::mem::take(&mut scratch.keys);
    keys.clear();
    keys.extend(indices.iter().map(|k| map_key(k, var)));
    out.origin.extend(0..m);
    let max_key = keys.iter().copied().max().unwrap_or(0);
    radix_sort(&mut keys, &mut out.origin, scratch, max_key);

    out.padded.reserve(m + 2);
    out.padded.push(SENTINEL);
    out.padded.extend_from_slice(&keys);
    out.padded.push(SENTINEL);
    scratch.keys = keys;

    // Position p starts a run when it differs from p - 1; p == m + 1 closes the last run.
    let padded = &out.padded;
    if m >= cfg.par_compact_min {
        out.starts.par_extend(
            (1..=m + 1)
                .into_par_iter()
                .filter(|&p| padded[p] != padded[p - 1]),
        );
    } else {
        out.starts.extend((1..=m + 1).filter(|&p| padded[p] != padded[p - 1]));
    }

    out.runs.extend(out.starts.windows(2).map(|w| Run {
        key: padded[w[0]],
        start: w[0] - 1,
        count: w[1] - w[0],
    }));
}

/// Stable LSD radix sort of `keys`, permuting `origin` alongside.
fn radix_sort(keys: &mut Vec<u64>, origin: &mut Vec<usize>, scratch: &mut SortScratch, max_key: u64) {
    let n = keys.len();
    let passes = radix_passes(max_key);
    if passes == 0 || n < 2 {
        return;
    }
    let mut tmp_keys = std::mem::take(&mut scratch.tmp_keys);
    let mut tmp_origin = std::mem::take(&mut scratch.tmp_origin);
    tmp_keys.resize(n, 0);
    tmp_origin.resize(n, 0);

    for pass in 0..passes {
        let shift = pass * 8;
        let mut counts = [0usize; RADIX];
        for &k in keys.iter() {
            counts[digit(k, shift)] += 1;
        }
        if counts.iter().any(|&c| c == n) {
            continue;
        }
        let mut offsets = [0usize; RADIX];
        let mut acc = 0usize;
        for (o, &c) in offsets.iter_mut().zip(counts.iter()) {
            *o = acc;
            acc += c;
        }
        for (&k, &p) in keys.iter().zip(origin.iter()) {
            let d = digit(k, shift);
            tmp_keys[offsets[d]] = k;
            tmp_origin[offsets[d]] = p;
            offsets[d] += 1;
        }
        std::mem::swap(keys, &mut tmp_keys);
        std::mem::swap(origin, &mut tmp_origin);
    }

    scratch.tmp_keys = tmp_keys;
    scratch.tmp_origin = tmp_origin;
}

#[inline]
fn digit(k: u64, shift: u32) -> usize {
    u64_to_usize((k >> shift) & 0xFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_invalid_keys_to_the_ends() {
        assert_eq!(map_key(-5, 4), 0);
        assert_eq!(map_key(0, 4), 1);
        assert_eq!(map_key(3, 4), 4);
        assert_eq!(map_key(4, 4), 5);
        assert_eq!(map_key(i64::MAX, 4), 5);
    }

    #[test]
    fn multi_pass_sort_is_stable() {
        let keys: Vec<i64> = vec![700, 3, 700, 70_000, 3, 0, 700];
        let g = sort_and_group(Indices::contiguous(&keys), 100_000, &EngineConfig::default());
        assert_eq!(g.sorted_keys(), &[1, 4, 4, 701, 701, 701, 70_001]);
        assert_eq!(g.origin(), &[5, 1, 4, 0, 2, 6, 3]);
        assert_eq!(g.runs().len(), 4);
        assert_eq!(g.runs()[2], Run { key: 701, start: 3, count: 3 });
    }

    #[test]
    fn parallel_compaction_matches_serial() {
        let keys: Vec<i32> = (0..5000).map(|i| (i * 37) % 211 - 3).collect();
        let serial = sort_and_group(Indices::contiguous(&keys), 200, &EngineConfig::default());
        let cfg = EngineConfig::default().with_par_compact_min(1);
        let parallel = sort_and_group(Indices::contiguous(&keys), 200, &cfg);
        assert_eq!(serial.runs(), parallel.runs());
        assert_eq!(serial.origin(), parallel.origin());
    }

    #[test]
    fn scratch_reuse_resets_state() {
        let cfg = EngineConfig::default();
        let mut scratch = SortScratch::default();
        let mut g = SortGroup::default();
        let a = vec![9i64, 1, 9, 1, 2];
        sort_and_group_into(Indices::contiguous(&a), 10, &cfg, &mut scratch, &mut g);
        assert_eq!(g.unique_valid(), 3);
        let b = vec![4i64];
        sort_and_group_into(Indices::contiguous(&b), 10, &cfg, &mut scratch, &mut g);
        assert_eq!(g.sorted_keys(), &[5]);
        assert_eq!(g.valid_runs().collect::<Vec<_>>(), vec![(4, &[0usize][..])]);
    }
}
