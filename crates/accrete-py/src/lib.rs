#![allow(
    clippy::needless_pass_by_value,
    reason = "PyReadonlyArray types are thin wrappers passed by value in pyo3 idioms"
)]
#![allow(
    clippy::unnecessary_wraps,
    reason = "PyO3 functions conventionally return PyResult for Python-facing APIs"
)]
#![allow(
    clippy::elidable_lifetime_names,
    reason = "Explicit 'py lifetimes are idiomatic and clear in PyO3 function signatures"
)]
use numpy::{PyReadonlyArray1, PyReadonlyArrayDyn, PyReadwriteArrayDyn, PyUntypedArrayMethods};
use pyo3::prelude::*;
use pyo3::types::PyModule;

use accrete_core::{IndexAddShape, Indices};
use accrete_kernels::{collision_score, index_add, AccumulatePath, RowAdd};

fn value_error(e: impl ToString) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())
}

const fn path_name(path: AccumulatePath) -> &'static str {
    match path {
        AccumulatePath::Empty => "empty",
        AccumulatePath::Owned => "owned",
        AccumulatePath::Adaptive => "adaptive",
        AccumulatePath::GroupedExact => "grouped_exact",
        AccumulatePath::Quantized => "quantized",
    }
}

fn index_add_nd<T: RowAdd + numpy::Element>(
    py: Python<'_>,
    mut dest: PyReadwriteArrayDyn<'_, T>,
    dim: usize,
    index: PyReadonlyArray1<'_, i64>,
    source: PyReadonlyArrayDyn<'_, T>,
    alpha: Option<T>,
    deterministic: bool,
) -> PyResult<(&'static str, usize, usize)> {
    let shape = IndexAddShape::from_dims(dest.shape(), source.shape(), dim).map_err(value_error)?;
    let idx = index.as_slice()?;
    let src = source.as_slice()?;
    let out = dest.as_slice_mut()?;
    let report = py
        .detach(|| index_add(out, &shape, Indices::contiguous(idx), src, alpha, deterministic))
        .map_err(value_error)?;
    Ok((path_name(report.path), report.direct_chunks, report.sorted_chunks))
}

/// In-place `dest.index_add_(dim, index, source, alpha)` over float64 arrays.
///
/// Returns `(path, direct_chunks, sorted_chunks)`.
#[pyfunction]
#[pyo3(signature = (dest, dim, index, source, alpha=None, deterministic=false))]
fn index_add_f64<'py>(
    py: Python<'py>,
    dest: PyReadwriteArrayDyn<'py, f64>,
    dim: usize,
    index: PyReadonlyArray1<'py, i64>,
    source: PyReadonlyArrayDyn<'py, f64>,
    alpha: Option<f64>,
    deterministic: bool,
) -> PyResult<(&'static str, usize, usize)> {
    index_add_nd(py, dest, dim, index, source, alpha, deterministic)
}

/// float32 variant of `index_add_f64`
#[pyfunction]
#[pyo3(signature = (dest, dim, index, source, alpha=None, deterministic=false))]
fn index_add_f32<'py>(
    py: Python<'py>,
    dest: PyReadwriteArrayDyn<'py, f32>,
    dim: usize,
    index: PyReadonlyArray1<'py, i64>,
    source: PyReadonlyArrayDyn<'py, f32>,
    alpha: Option<f32>,
    deterministic: bool,
) -> PyResult<(&'static str, usize, usize)> {
    index_add_nd(py, dest, dim, index, source, alpha, deterministic)
}

/// int64 variant of `index_add_f64`; integer sums are always exact.
#[pyfunction]
#[pyo3(signature = (dest, dim, index, source, alpha=None))]
fn index_add_i64<'py>(
    py: Python<'py>,
    dest: PyReadwriteArrayDyn<'py, i64>,
    dim: usize,
    index: PyReadonlyArray1<'py, i64>,
    source: PyReadonlyArrayDyn<'py, i64>,
    alpha: Option<i64>,
) -> PyResult<(&'static str, usize, usize)> {
    index_add_nd(py, dest, dim, index, source, alpha, false)
}

#[pyfunction]
#[pyo3(signature = (index, buckets=128))]
fn collision_score_from_parts(index: PyReadonlyArray1<'_, i64>, buckets: usize) -> PyResult<f64> {
    Ok(collision_score(Indices::contiguous(index.as_slice()?), buckets))
}

#[pymodule]
fn _core(m: &Bound<PyModule>) -> PyResult<()> {
    m.add("version", accrete_core::VERSION)?;
    m.add_function(wrap_pyfunction!(index_add_f64, m)?)?;
    m.add_function(wrap_pyfunction!(index_add_f32, m)?)?;
    m.add_function(wrap_pyfunction!(index_add_i64, m)?)?;
    m.add_function(wrap_pyfunction!(collision_score_from_parts, m)?)?;
    Ok(())
}
