//! Core data structures and traits for Accrete (pure Rust)
//!
//! The engine views every scatter-add problem as a destination of shape
//! `[outer, var_axis, inner]`, an index stream of length `N` into `var_axis`, and
//! update rows of shape `[outer, N, inner]`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod element;
pub mod error;
pub mod index;
pub mod plan;
pub mod shape;

pub use config::EngineConfig;
pub use element::{DType, Element};
pub use error::{Error, Result};
pub use index::{IndexValue, Indices};
pub use plan::{Plan, ShardAxis};
pub use shape::IndexAddShape;
