//! # Sweepflow
//!
//! Declarative construction and dispatch of experiment sweeps.
//!
//! Sweepflow builds a directed acyclic graph of experiment stages from
//! composable parameter sets, and hands each stage to a batch queue with
//! the right holds on its prerequisites. It provides:
//!
//! - **Parameter algebra**: right-biased composition of ordered key/value
//!   sets that derive a directory name and an argument list
//! - **Stage graphs**: an arena of stages with prerequisite edges, frozen
//!   before directories are assigned and references resolved
//! - **Resource planning**: memory heuristics and explicit out-of-memory
//!   escalation ladders
//! - **Dispatch**: script rendering, memoization of finished stages and
//!   queue submission that never retries on its own
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sweepflow::prelude::*;
//!
//! let config = RunnerConfig::default().with_dry_run(true);
//! let kind: ExperimentKind = "dp-cll".parse()?;
//! let ctx = ExperimentContext::from_config(&config).with_heuristic(kind.heuristic());
//! let mut graph = kind.build(&ctx)?;
//!
//! let report = Runner::new(config.clone())
//!     .with_planner(ctx.planner.clone())
//!     .run(&mut graph, &config.experiment_dir(kind.as_str()))?;
//! println!("{}", report.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod experiments;
pub mod graph;
pub mod observability;
pub mod params;
pub mod resources;
pub mod runner;
pub mod testing;
pub mod transform;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{JavaConfig, Profiling, ResourceConfig, RunnerConfig};
    pub use crate::core::{ParamValue, StageKind, StageStatus};
    pub use crate::errors::{
        ConfigError, GraphError, ResourceEstimationError, SubmissionError, SweepflowError,
        UnresolvedReferenceError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RunEventKind,
    };
    pub use crate::experiments::{ExperimentContext, ExperimentKind};
    pub use crate::graph::{Stage, StageGraph, StageId, StagePath, StageSpec};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::params::ParamSet;
    pub use crate::resources::{get_oome_stages, MemoryHeuristic, ResourcePlan, ResourcePlanner};
    pub use crate::runner::{
        FsMemoStore, LocalSubmitter, MemoStore, QueueSubmitter, RunReport, Runner, SgeSubmitter,
        StageOutcome,
    };
    pub use crate::transform::{FastMode, SmallMachine};
    pub use crate::utils::{generate_run_id, iso_timestamp, Timestamp};
}
