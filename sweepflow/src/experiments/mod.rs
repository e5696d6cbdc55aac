//! Dependency parsing experiment definitions.
//!
//! Each [`ExperimentKind`] names a builder that composes parameter groups
//! from [`defs`] into a fresh [`StageGraph`](crate::graph::StageGraph).
//! Builders read only the [`ExperimentContext`], so building the same kind
//! twice with the same seed gives the same graph.

mod context;
pub mod defs;
mod dp;
mod registry;

pub use context::ExperimentContext;
pub use dp::{ANNO_PIPELINE_MAIN, GOBBLE_MEMORY_MAIN};
pub use registry::{BuildFn, ExperimentKind};
