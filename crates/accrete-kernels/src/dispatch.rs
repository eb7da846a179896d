//! Strategy dispatcher: validates, picks the path and drives the staged kernels
//
// Start -> ShardingChosen (plan) -> CollisionEstimated (per-chunk decisions and
// sort-groups) -> DirectScatter | SortGroup [-> QuantizedCombine] -> Done.

use std::cell::RefCell;
use std::ops::Range;

use accrete_core::{
    Element, EngineConfig, IndexAddShape, IndexValue, Indices, Plan, Result, ShardAxis,
};
use rayon::prelude::*;
use thread_local::ThreadLocal;

use crate::estimate::{choose_path, ChunkPath};
use crate::group::{reduce_runs, GroupedRows};
use crate::planner::{plan, ResourceBudget};
use crate::quant::{self, QuantWorkspace};
use crate::scatter::ScatterTarget;
use crate::sort::{sort_and_group_into, SortGroup, SortScratch};
use crate::util::RowAdd;

/// How an invocation accumulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccumulatePath {
    /// No update reached the destination
    Empty,
    /// Units own disjoint destination elements; chunks add directly or grouped
    Owned,
    /// Units share the destination; chunks add directly or grouped, with atomics
    Adaptive,
    /// Every chunk grouped, integer sums added with exact atomics
    GroupedExact,
    /// Every chunk grouped and combined through the quantized accumulator
    Quantized,
}

/// What the dispatcher decided for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub axis: ShardAxis,
    pub units: usize,
    pub path: AccumulatePath,
    /// Chunks that took the direct path
    pub direct_chunks: usize,
    /// Chunks that were sorted and grouped
    pub sorted_chunks: usize,
}

const fn select_path(axis: ShardAxis, deterministic: bool, is_float: bool) -> AccumulatePath {
    match axis {
        ShardAxis::Outer | ShardAxis::Inner => AccumulatePath::Owned,
        ShardAxis::Index if !deterministic => AccumulatePath::Adaptive,
        ShardAxis::Index if is_float => AccumulatePath::Quantized,
        ShardAxis::Index => AccumulatePath::GroupedExact,
    }
}

/// Per-invocation view of the inputs shared by every stage
struct Job<'a, T, I> {
    shape: IndexAddShape,
    plan: Plan,
    indices: Indices<'a, I>,
    updates: &'a [T],
    alpha: Option<T>,
}

impl<'a, T: RowAdd, I: IndexValue> Job<'a, T, I> {
    fn blocks(&self) -> usize {
        self.plan.num_blocks(self.shape.num_indices)
    }

    fn block(&self, b: usize) -> (usize, Indices<'a, I>) {
        let start = b * self.plan.block_rows;
        (start, self.indices.slice(start, start + self.plan.block_rows))
    }

    #[inline]
    fn update_row(&self, o: usize, i: usize, cols: &Range<usize>) -> &'a [T] {
        let base = self.shape.update_row(o, i) * self.shape.inner;
        &self.updates[base + cols.start..base + cols.end]
    }

    /// Outer slices, columns and chunks owned by `unit`
    fn unit_work(&self, unit: usize) -> (Range<usize>, Range<usize>, Range<usize>) {
        let (outer, inner) = (self.shape.outer, self.shape.inner);
        match self.plan.axis {
            ShardAxis::Outer => (self.plan.unit_range(unit, outer), 0..inner, 0..self.blocks()),
            ShardAxis::Inner => (0..outer, self.plan.inner_cols(unit, inner), 0..self.blocks()),
            ShardAxis::Index => (0..outer, 0..inner, self.plan.unit_range(unit, self.blocks())),
        }
    }
}

/// Scatter-add engine holding the tuning configuration.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plan for the current rayon pool
    #[must_use]
    pub fn plan<T: Element>(&self, shape: &IndexAddShape, deterministic: bool) -> Plan {
        plan(shape, T::DTYPE, &ResourceBudget::detect(), deterministic)
    }

    /// `dest[o, indices[i], :] += alpha * updates[o, i, :]` for every valid index.
    ///
    /// All preconditions are checked before `dest` is touched. Out-of-range indices are
    /// skipped. With `deterministic`, the result is bit-identical for any `plan.units`.
    /// The quantized path uses `workspace` when given, otherwise allocates its own.
    #[allow(clippy::too_many_arguments)]
    pub fn index_add<T: RowAdd, I: IndexValue>(
        &self,
        dest: &mut [T],
        shape: &IndexAddShape,
        indices: Indices<'_, I>,
        updates: &[T],
        alpha: Option<T>,
        deterministic: bool,
        plan: &Plan,
        workspace: Option<&mut QuantWorkspace>,
    ) -> Result<DispatchReport> {
        shape.validate(dest.len(), updates.len(), indices.len())?;
        plan.validate(shape)?;

        let path = select_path(plan.axis, deterministic, T::DTYPE.is_float());
        let mut local = None;
        let workspace = match (path, workspace) {
            (AccumulatePath::Quantized, Some(ws)) => {
                ws.check(shape)?;
                Some(ws)
            }
            (AccumulatePath::Quantized, None) => Some(local.insert(QuantWorkspace::new(shape)?)),
            _ => None,
        };
        if deterministic && path == AccumulatePath::GroupedExact {
            log::debug!("integer destination: grouped exact adds instead of quantization");
        }

        let mut report = DispatchReport {
            axis: plan.axis,
            units: plan.units,
            path,
            direct_chunks: 0,
            sorted_chunks: 0,
        };
        if shape.num_indices == 0 || shape.outer == 0 || shape.inner == 0 || shape.var_axis == 0 {
            report.path = AccumulatePath::Empty;
            log::debug!("index_add: nothing to accumulate for {shape:?}");
            return Ok(report);
        }

        let job = Job {
            shape: *shape,
            plan: *plan,
            indices,
            updates,
            alpha,
        };
        let groups = self.estimate_and_group(&job, path);
        report.sorted_chunks = groups.iter().filter(|g| g.is_some()).count();
        report.direct_chunks = groups.len() - report.sorted_chunks;
        log::debug!(
            "index_add: axis={:?} units={} path={path:?} chunks direct={} sorted={}",
            plan.axis,
            plan.units,
            report.direct_chunks,
            report.sorted_chunks
        );

        match workspace {
            Some(ws) => self.run_quantized(&job, &groups, dest, ws),
            None => run_scatter(&job, &groups, dest),
        }
        Ok(report)
    }

    /// Decide every chunk's path, then sort and group the chunks that need it.
    fn estimate_and_group<T: RowAdd, I: IndexValue>(
        &self,
        job: &Job<'_, T, I>,
        path: AccumulatePath,
    ) -> Vec<Option<SortGroup>> {
        let cfg = &self.config;
        let blocks = job.blocks();
        let decisions: Vec<ChunkPath> = match path {
            AccumulatePath::GroupedExact | AccumulatePath::Quantized => {
                vec![ChunkPath::SortGroup; blocks]
            }
            _ => (0..blocks)
                .into_par_iter()
                .map(|b| choose_path(job.block(b).1, cfg))
                .collect(),
        };

        let tls: ThreadLocal<RefCell<SortScratch>> = ThreadLocal::new();
        decisions
            .par_iter()
            .enumerate()
            .map(|(b, d)| {
                (*d == ChunkPath::SortGroup).then(|| {
                    let cell = tls.get_or(|| RefCell::new(SortScratch::default()));
                    let mut group = SortGroup::default();
                    let (_, idx) = job.block(b);
                    let var_axis = job.shape.var_axis;
                    // Parallel compaction may steal another chunk onto this thread.
                    match cell.try_borrow_mut() {
                        Ok(mut scratch) => {
                            sort_and_group_into(idx, var_axis, cfg, &mut scratch, &mut group);
                        }
                        Err(_) => {
                            let mut scratch = SortScratch::default();
                            sort_and_group_into(idx, var_axis, cfg, &mut scratch, &mut group);
                        }
                    }
                    group
                })
            })
            .collect()
    }

    fn run_quantized<T: RowAdd, I: IndexValue>(
        &self,
        job: &Job<'_, T, I>,
        groups: &[Option<SortGroup>],
        dest: &mut [T],
        ws: &mut QuantWorkspace,
    ) {
        ws.reset();
        let ws: &QuantWorkspace = ws;
        let shape = &job.shape;
        let all_cols = 0..shape.inner;

        // Stage 1: grouped partials per (chunk, outer slice), magnitudes and counts.
        let partials: Vec<GroupedRows<T>> = (0..job.plan.units)
            .into_par_iter()
            .flat_map_iter(|u| {
                let (_, _, blocks) = job.unit_work(u);
                let mut out = Vec::new();
                for b in blocks {
                    let Some(group) = &groups[b] else {
                        continue;
                    };
                    let (start, _) = job.block(b);
                    for o in 0..shape.outer {
                        let mut rows = GroupedRows::new(shape.inner);
                        reduce_runs(
                            group,
                            shape.dest_row(o, 0),
                            None,
                            |p| job.update_row(o, start + p, &all_cols),
                            &mut rows,
                        );
                        ws.observe(&rows, shape.inner);
                        out.push(rows);
                    }
                }
                out
            })
            .collect();

        // Stages 2 and 3
        quant::finish(
            ws,
            &partials,
            dest,
            shape,
            self.config.scale_bits,
            job.alpha,
            shape.is_sparse(),
        );
    }
}

/// Direct and grouped adds, unit by unit over the work each unit owns.
fn run_scatter<T: RowAdd, I: IndexValue>(
    job: &Job<'_, T, I>,
    groups: &[Option<SortGroup>],
    dest: &mut [T],
) {
    let shape = &job.shape;
    let target = ScatterTarget::<T>::new(T::as_atomic(dest), *shape);
    (0..job.plan.units).into_par_iter().for_each(|u| {
        let (outer, cols, blocks) = job.unit_work(u);
        if outer.is_empty() || cols.is_empty() || blocks.is_empty() {
            return;
        }
        let target = target.with_cols(cols.clone());
        let mut buf = GroupedRows::new(cols.len());
        for b in blocks {
            let (start, idx) = job.block(b);
            match &groups[b] {
                None => target.scatter_chunk(outer.clone(), start, idx, job.updates, job.alpha),
                Some(group) => {
                    for o in outer.clone() {
                        buf.reset(cols.len());
                        reduce_runs(
                            group,
                            shape.dest_row(o, 0),
                            job.alpha,
                            |p| job.update_row(o, start + p, &cols),
                            &mut buf,
                        );
                        target.add_grouped(&buf);
                    }
                }
            }
        }
    });
}

/// `index_add` with an engine configured from the environment (`EngineConfig::from_env`),
/// a plan for the current rayon pool and an internally allocated workspace.
pub fn index_add<T: RowAdd, I: IndexValue>(
    dest: &mut [T],
    shape: &IndexAddShape,
    indices: Indices<'_, I>,
    updates: &[T],
    alpha: Option<T>,
    deterministic: bool,
) -> Result<DispatchReport> {
    let engine = Engine::new(EngineConfig::from_env()?)?;
    let plan = engine.plan::<T>(shape, deterministic);
    engine.index_add(dest, shape, indices, updates, alpha, deterministic, &plan, None)
}
