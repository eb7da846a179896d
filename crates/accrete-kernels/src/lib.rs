//! Scatter-add kernels for Accrete (pure Rust, SIMD/parallel)

pub fn init_parallel() {
    // Rayon auto-detects threads by default; users may set RAYON_NUM_THREADS.
}

pub mod dispatch;
pub mod estimate;
pub mod group;
pub mod planner;
pub mod quant;
pub mod scatter;
pub mod sort;
pub mod util;

pub use dispatch::{index_add, AccumulatePath, DispatchReport, Engine};
pub use estimate::{choose_path, collision_score, ChunkPath};
pub use group::{reduce_runs, GroupedRows};
pub use planner::{plan, ResourceBudget};
pub use quant::QuantWorkspace;
pub use scatter::{scatter_add, ScatterTarget};
pub use sort::{sort_and_group, Run, SortGroup};
pub use util::RowAdd;
