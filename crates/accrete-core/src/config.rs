//! Engine tuning knobs

use crate::error::{Error, Result};

pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 128;
pub const DEFAULT_COLLISION_THRESHOLD: f64 = 0.01;
pub const DEFAULT_SORT_MIN_ROWS: usize = 64;
pub const DEFAULT_SCALE_BITS: u32 = 30;
pub const DEFAULT_PAR_COMPACT_MIN: usize = 1 << 15;

/// Collision-estimator, sorter and quantizer settings.
///
/// Thread count is not configured here; rayon honors `RAYON_NUM_THREADS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Histogram size of the collision estimator
    pub histogram_buckets: usize,
    /// Scores above this route a chunk to sort-and-group
    pub collision_threshold: f64,
    /// Chunks shorter than this always scatter directly
    pub sort_min_rows: usize,
    /// Fixed-point fraction bits of the quantized accumulator
    pub scale_bits: u32,
    /// Chunks at least this long compact run starts in parallel
    pub par_compact_min: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS,
            collision_threshold: DEFAULT_COLLISION_THRESHOLD,
            sort_min_rows: DEFAULT_SORT_MIN_ROWS,
            scale_bits: DEFAULT_SCALE_BITS,
            par_compact_min: DEFAULT_PAR_COMPACT_MIN,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn with_histogram_buckets(mut self, buckets: usize) -> Self {
        self.histogram_buckets = buckets;
        self
    }

    #[must_use]
    pub const fn with_collision_threshold(mut self, threshold: f64) -> Self {
        self.collision_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_sort_min_rows(mut self, rows: usize) -> Self {
        self.sort_min_rows = rows;
        self
    }

    #[must_use]
    pub const fn with_scale_bits(mut self, bits: u32) -> Self {
        self.scale_bits = bits;
        self
    }

    #[must_use]
    pub const fn with_par_compact_min(mut self, rows: usize) -> Self {
        self.par_compact_min = rows;
        self
    }

    /// Defaults overridden by `ACCRETE_COLLISION_THRESHOLD`, `ACCRETE_HISTOGRAM_BUCKETS`
    /// and `ACCRETE_SORT_MIN_ROWS` when set.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = env_var("ACCRETE_COLLISION_THRESHOLD") {
            cfg.collision_threshold = v
                .parse()
                .map_err(|e| Error::invalid_argument("ACCRETE_COLLISION_THRESHOLD", format!("{e}")))?;
        }
        if let Some(v) = env_var("ACCRETE_HISTOGRAM_BUCKETS") {
            cfg.histogram_buckets = v
                .parse()
                .map_err(|e| Error::invalid_argument("ACCRETE_HISTOGRAM_BUCKETS", format!("{e}")))?;
        }
        if let Some(v) = env_var("ACCRETE_SORT_MIN_ROWS") {
            cfg.sort_min_rows = v
                .parse()
                .map_err(|e| Error::invalid_argument("ACCRETE_SORT_MIN_ROWS", format!("{e}")))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.histogram_buckets == 0 {
            return Err(Error::invalid_argument("histogram_buckets", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.collision_threshold) {
            return Err(Error::invalid_argument(
                "collision_threshold",
                format!("{} is outside [0, 1]", self.collision_threshold),
            ));
        }
        // Quantized sums must stay exact in an f64 mantissa
        if self.scale_bits == 0 || self.scale_bits > 52 {
            return Err(Error::invalid_argument(
                "scale_bits",
                format!("{} is outside [1, 52]", self.scale_bits),
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty()).map(|v| v.trim().to_string())
}
