//! Testing utilities for sweepflow graphs and runs.
//!
//! This module provides:
//! - Small graph fixtures (chain, diamond)
//! - A recording submission backend

mod fixtures;
mod mocks;

pub use fixtures::{chain_graph, diamond_graph};
pub use mocks::RecordingSubmitter;
