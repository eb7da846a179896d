//! Planner: sharded axis, unit count and chunk sizes from shape statistics

use accrete_core::{DType, IndexAddShape, Plan, ShardAxis};

use crate::util::{DEFAULT_SCRATCH_BYTES, MAX_BLOCK_ROWS, MIN_BLOCK_ROWS};

/// Inner rows at least this many bytes per unit are split by columns
const MIN_INNER_BYTES_PER_UNIT: usize = 128;
/// Sort keys, origin positions and both ping-pong copies, per index row
const SORT_BYTES_PER_ROW: usize = 32;

/// Execution resources an invocation may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudget {
    /// Logical execution units
    pub units: usize,
    /// Scratch memory per unit
    pub scratch_bytes: usize,
}

impl ResourceBudget {
    #[must_use]
    pub const fn new(units: usize, scratch_bytes: usize) -> Self {
        Self {
            units,
            scratch_bytes,
        }
    }

    /// One unit per rayon worker
    #[must_use]
    pub fn detect() -> Self {
        Self::new(rayon::current_num_threads().max(1), DEFAULT_SCRATCH_BYTES)
    }
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self::detect()
    }
}

/// Choose a plan for `shape` over elements of `dtype`.
///
/// The block size depends on the scratch budget and the row width only, so two budgets
/// that differ in `units` alone chunk the index stream identically. Deterministic
/// float problems always shard the index axis: the quantized result is then the same
/// for any pool size, while an axis picked from `units` would change the summation.
#[must_use]
pub fn plan(shape: &IndexAddShape, dtype: DType, budget: &ResourceBudget, deterministic: bool) -> Plan {
    let units = budget.units.max(1);
    let row_bytes = shape.inner.saturating_mul(dtype.size_of());

    let axis = if deterministic && dtype.is_float() {
        ShardAxis::Index
    } else if shape.outer >= units {
        ShardAxis::Outer
    } else if row_bytes >= units.saturating_mul(MIN_INNER_BYTES_PER_UNIT)
        || shape.num_indices < units / 2
    {
        ShardAxis::Inner
    } else {
        ShardAxis::Index
    };

    // The quantized path keeps a partial row and its reference slot resident.
    let resident = if deterministic && dtype.is_float() { 2 } else { 1 };
    let per_row = SORT_BYTES_PER_ROW.saturating_add(row_bytes.saturating_mul(resident));
    let block_rows = (budget.scratch_bytes / per_row).clamp(MIN_BLOCK_ROWS, MAX_BLOCK_ROWS);

    let inner_chunk = match axis {
        ShardAxis::Inner => shape.inner.div_ceil(units).max(1),
        ShardAxis::Outer | ShardAxis::Index => shape.inner.max(1),
    };

    let plan = Plan::new(axis, units, block_rows, inner_chunk);
    log::debug!("plan for {shape:?} ({dtype:?}, deterministic={deterministic}): {plan:?}");
    plan
}
