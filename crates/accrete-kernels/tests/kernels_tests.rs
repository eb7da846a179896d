use accrete_core::{EngineConfig, Error, IndexAddShape, Indices, Plan, ShardAxis};
use accrete_kernels::{index_add, AccumulatePath, Engine, QuantWorkspace};

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

/// Sequential reference in f64
fn reference(
    dest: &[f64],
    shape: &IndexAddShape,
    indices: &[i64],
    updates: &[f64],
    alpha: f64,
) -> Vec<f64> {
    let mut out = dest.to_vec();
    for o in 0..shape.outer {
        for (i, &k) in indices.iter().enumerate() {
            if k < 0 || k as usize >= shape.var_axis {
                continue;
            }
            for j in 0..shape.inner {
                let d = (o * shape.var_axis + k as usize) * shape.inner + j;
                let u = (o * shape.num_indices + i) * shape.inner + j;
                out[d] += alpha * updates[u];
            }
        }
    }
    out
}

/// Deterministic pseudo-random stream
fn lcg(seed: u64, n: usize) -> Vec<u64> {
    let mut s = seed;
    (0..n)
        .map(|_| {
            s = s.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            s >> 33
        })
        .collect()
}

fn all_plans(units: usize, block_rows: usize, inner: usize) -> Vec<Plan> {
    vec![
        Plan::new(ShardAxis::Outer, units, block_rows, inner),
        Plan::new(ShardAxis::Index, units, block_rows, inner),
        Plan::new(ShardAxis::Inner, units, block_rows, inner.div_ceil(units).max(1)),
    ]
}

#[test]
fn scenario_duplicate_index_sums() {
    let shape = IndexAddShape::rows(3, 1, 3);
    let idx = vec![0i64, 1, 0];
    let updates = vec![1.0f64, 1.0, 1.0];
    for deterministic in [false, true] {
        let mut dest = vec![0.0f64; 3];
        index_add(&mut dest, &shape, Indices::contiguous(&idx), &updates, None, deterministic).unwrap();
        assert_eq!(dest, vec![2.0, 1.0, 0.0]);
    }
    let engine = Engine::default();
    for plan in all_plans(2, 1, 1) {
        let mut dest = vec![0.0f64; 3];
        engine
            .index_add(&mut dest, &shape, Indices::contiguous(&idx), &updates, None, true, &plan, None)
            .unwrap();
        assert_eq!(dest, vec![2.0, 1.0, 0.0], "plan {plan:?}");
    }
}

#[test]
fn scenario_quantized_unit_count_independent() {
    let shape = IndexAddShape::rows(1, 1, 4);
    let idx = vec![0i32; 4];
    let updates = vec![1.0f64, 2.0, 3.0, 4.0];
    let engine = Engine::default();
    for plan in [
        Plan::new(ShardAxis::Index, 1, 4, 1),
        Plan::new(ShardAxis::Index, 4, 1, 1),
    ] {
        let mut dest = vec![0.0f64];
        let report = engine
            .index_add(&mut dest, &shape, Indices::contiguous(&idx), &updates, None, true, &plan, None)
            .unwrap();
        assert_eq!(report.path, AccumulatePath::Quantized);
        assert_eq!(dest, vec![10.0]);
    }
}

#[test]
fn scenario_collision_routing() {
    let engine = Engine::default();
    let plan = Plan::new(ShardAxis::Index, 4, 1000, 1);

    let unique: Vec<i64> = (0..1000).collect();
    let shape = IndexAddShape::rows(1000, 1, 1000);
    let updates = vec![1.0f64; 1000];
    let mut dest = vec![0.0f64; 1000];
    let report = engine
        .index_add(&mut dest, &shape, Indices::contiguous(&unique), &updates, None, false, &plan, None)
        .unwrap();
    assert_eq!(report.path, AccumulatePath::Adaptive);
    assert_eq!((report.direct_chunks, report.sorted_chunks), (1, 0));
    assert!(dest.iter().all(|&v| v == 1.0));

    let heavy: Vec<i64> = (0..1000).map(|i| if i % 5 < 3 { 7 } else { i }).collect();
    let mut dest = vec![0.0f64; 1000];
    let report = engine
        .index_add(&mut dest, &shape, Indices::contiguous(&heavy), &updates, None, false, &plan, None)
        .unwrap();
    assert_eq!((report.direct_chunks, report.sorted_chunks), (0, 1));
    let expected = reference(&vec![0.0; 1000], &shape, &heavy, &updates, 1.0);
    assert_eq!(dest, expected);
}

#[test]
fn scenario_alpha_scaling() {
    let shape = IndexAddShape::rows(1, 1, 2);
    let idx = vec![0i64, 0];
    let updates = vec![2.0f64, 3.0];
    let engine = Engine::default();
    for deterministic in [false, true] {
        for plan in all_plans(3, 2, 1) {
            let mut dest = vec![5.0f64];
            engine
                .index_add(
                    &mut dest,
                    &shape,
                    Indices::contiguous(&idx),
                    &updates,
                    Some(10.0),
                    deterministic,
                    &plan,
                    None,
                )
                .unwrap();
            assert_eq!(dest, vec![55.0], "plan {plan:?} deterministic={deterministic}");
        }
    }
}

#[test]
fn every_path_matches_reference() {
    let shape = IndexAddShape::new(3, 41, 5, 900);
    let raw = lcg(11, 900 + 3 * 900 * 5);
    let idx: Vec<i64> = raw[..900].iter().map(|&r| (r % 50) as i64 - 4).collect();
    let updates: Vec<f64> = raw[900..].iter().map(|&r| (r % 2000) as f64 / 100.0 - 10.0).collect();
    let dest0: Vec<f64> = (0..3 * 41 * 5).map(|i| i as f64 * 0.5).collect();
    let expected = reference(&dest0, &shape, &idx, &updates, 0.75);

    let engine = Engine::new(EngineConfig::default().with_sort_min_rows(16)).unwrap();
    for units in [1, 2, 7] {
        for plan in all_plans(units, 128, 5) {
            for deterministic in [false, true] {
                let mut dest = dest0.clone();
                engine
                    .index_add(
                        &mut dest,
                        &shape,
                        Indices::contiguous(&idx),
                        &updates,
                        Some(0.75),
                        deterministic,
                        &plan,
                        None,
                    )
                    .unwrap();
                for (a, b) in dest.iter().zip(&expected) {
                    assert!((a - b).abs() < 1e-4, "plan {plan:?}: {a} vs {b}");
                }
            }
        }
    }
}

#[test]
fn quantized_bit_identical_across_units() {
    let n = 5000;
    let shape = IndexAddShape::rows(37, 3, n);
    let raw = lcg(42, n + n * 3);
    let idx: Vec<i64> = raw[..n].iter().map(|&r| (r % 37) as i64).collect();
    let updates: Vec<f32> = raw[n..].iter().map(|&r| (r % 10_007) as f32 * 1e-3 - 5.0).collect();
    let engine = Engine::default();

    let mut outputs = Vec::new();
    for units in [1, 4, 64] {
        let plan = Plan::new(ShardAxis::Index, units, 128, 3);
        let mut ws = QuantWorkspace::new(&shape).unwrap();
        let mut dest = vec![0.25f32; 37 * 3];
        let report = engine
            .index_add(
                &mut dest,
                &shape,
                Indices::contiguous(&idx),
                &updates,
                Some(1.5),
                true,
                &plan,
                Some(&mut ws),
            )
            .unwrap();
        assert_eq!(report.path, AccumulatePath::Quantized);
        outputs.push(dest.iter().map(|v| v.to_bits()).collect::<Vec<_>>());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn workspace_is_reset_between_calls() {
    let shape = IndexAddShape::rows(4, 2, 3);
    let idx = vec![1i64, 3, 1];
    let updates = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let plan = Plan::new(ShardAxis::Index, 2, 2, 2);
    let engine = Engine::default();
    let mut ws = QuantWorkspace::new(&shape).unwrap();
    let mut first = vec![0.0f64; 8];
    let mut second = vec![0.0f64; 8];
    for dest in [&mut first, &mut second] {
        engine
            .index_add(dest, &shape, Indices::contiguous(&idx), &updates, None, true, &plan, Some(&mut ws))
            .unwrap();
    }
    assert_eq!(first, second);
    assert!(approx_eq(first[2], 6.0));
    assert!(approx_eq(first[3], 8.0));
}

#[test]
fn out_of_range_indices_are_skipped() {
    let shape = IndexAddShape::rows(3, 1, 5);
    let idx = vec![-1i64, 3, 2, i64::MAX, 2];
    let updates = vec![100.0f64, 200.0, 1.0, 300.0, 2.0];
    let engine = Engine::default();
    for deterministic in [false, true] {
        for plan in all_plans(2, 2, 1) {
            let mut dest = vec![0.0f64; 3];
            engine
                .index_add(&mut dest, &shape, Indices::contiguous(&idx), &updates, None, deterministic, &plan, None)
                .unwrap();
            assert_eq!(dest, vec![0.0, 0.0, 3.0]);
        }
    }
}

#[test]
fn empty_input_leaves_dest_unchanged() {
    let shape = IndexAddShape::rows(3, 2, 0);
    let idx: Vec<i32> = Vec::new();
    let updates: Vec<f64> = Vec::new();
    let mut dest = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let report = index_add(&mut dest, &shape, Indices::contiguous(&idx), &updates, Some(2.0), true).unwrap();
    assert_eq!(report.path, AccumulatePath::Empty);
    assert_eq!(dest, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn preconditions_fail_before_any_write() {
    let shape = IndexAddShape::rows(2, 2, 2);
    let idx = vec![0i64, 1];
    let engine = Engine::default();
    let plan = Plan::new(ShardAxis::Index, 2, 1, 2);

    let mut dest = vec![1.0f64; 4];
    let err = engine
        .index_add(&mut dest, &shape, Indices::contiguous(&idx), &[1.0; 3], None, false, &plan, None)
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { what: "updates", .. }));
    assert_eq!(dest, vec![1.0; 4]);

    let mut small = QuantWorkspace::with_capacity(1, 2);
    let err = engine
        .index_add(&mut dest, &shape, Indices::contiguous(&idx), &[1.0; 4], None, true, &plan, Some(&mut small))
        .unwrap_err();
    assert!(matches!(err, Error::WorkspaceTooSmall { .. }));
    assert_eq!(dest, vec![1.0; 4]);

    let err = engine
        .index_add(&mut dest, &shape, Indices::contiguous(&idx), &[1.0; 4], None, false, &plan.with_units(0), None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPlan { .. }));
    assert_eq!(dest, vec![1.0; 4]);
}

#[test]
fn integer_deterministic_uses_exact_grouping() {
    let shape = IndexAddShape::rows(2, 1, 6);
    let idx = vec![1i32, 1, 0, 1, 0, 1];
    let updates = vec![1i64, 2, 3, 4, 5, 6];
    let plan = Plan::new(ShardAxis::Index, 3, 2, 1);
    let mut dest = vec![10i64, 20];
    let report = Engine::default()
        .index_add(&mut dest, &shape, Indices::contiguous(&idx), &updates, Some(2), true, &plan, None)
        .unwrap();
    assert_eq!(report.path, AccumulatePath::GroupedExact);
    assert_eq!(report.sorted_chunks, 3);
    assert_eq!(dest, vec![26, 46]);
}

#[test]
fn strided_indices_follow_stride() {
    let shape = IndexAddShape::rows(2, 1, 3);
    let backing = vec![1i64, 99, 0, 99, 1];
    let idx = Indices::strided(&backing, 3, 2).unwrap();
    let mut dest = vec![0.0f32; 2];
    index_add(&mut dest, &shape, idx, &[1.0, 2.0, 4.0], None, false).unwrap();
    assert_eq!(dest, vec![2.0, 5.0]);
}

#[test]
fn sparse_finish_matches_dense_finish() {
    // 20 indices into 1000 rows finishes over touched rows only.
    let sparse = IndexAddShape::rows(1000, 2, 20);
    assert!(sparse.is_sparse());
    let idx: Vec<i64> = (0..20).map(|i| (i * 7) % 13 * 50).collect();
    let updates: Vec<f64> = (0..40).map(|i| f64::from(i) * 0.37).collect();
    let expected = reference(&vec![0.0; 2000], &sparse, &idx, &updates, 1.0);
    let mut dest = vec![0.0f64; 2000];
    let plan = Plan::new(ShardAxis::Index, 4, 4, 2);
    Engine::default()
        .index_add(&mut dest, &sparse, Indices::contiguous(&idx), &updates, None, true, &plan, None)
        .unwrap();
    for (a, b) in dest.iter().zip(&expected) {
        assert!(approx_eq(*a, *b));
    }
}

#[test]
fn deterministic_bits_independent_of_pool_size() {
    let n = 20_000;
    let shape = IndexAddShape::new(4, 8, 1, n);
    let raw = lcg(7, n + 4 * n);
    let idx: Vec<i64> = raw[..n].iter().map(|&r| (r % 8) as i64).collect();
    let updates: Vec<f64> = raw[n..].iter().map(|&r| (r % 9973) as f64 * 1e-3 - 4.0).collect();

    let mut outputs = Vec::new();
    for threads in [1, 4, 16] {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        let mut dest = vec![0.5f64; 4 * 8];
        let report = pool
            .install(|| index_add(&mut dest, &shape, Indices::contiguous(&idx), &updates, None, true))
            .unwrap();
        assert_eq!(report.axis, ShardAxis::Index, "{threads} threads");
        assert_eq!(report.path, AccumulatePath::Quantized);
        outputs.push(dest.iter().map(|v| v.to_bits()).collect::<Vec<_>>());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[test]
fn engine_keeps_its_config() {
    let cfg = EngineConfig::default().with_sort_min_rows(16).with_histogram_buckets(64);
    let engine = Engine::new(cfg).unwrap();
    assert_eq!(engine.config().sort_min_rows, 16);
    assert_eq!(engine.config().histogram_buckets, 64);
    let err = Engine::new(EngineConfig::default().with_collision_threshold(2.0)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "collision_threshold", .. }));
}
