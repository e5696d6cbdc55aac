//! The stage dependency graph.
//!
//! Stages live in an arena owned by [`StageGraph`] and refer to each other
//! by [`StageId`]. The graph goes through a fixed lifecycle: build, freeze,
//! assign directories, resolve references. Only the runner changes stage
//! statuses afterwards.

mod arena;
mod directories;
mod manifest;
mod path;
mod stage;
mod traversal;

pub use arena::{ResolvedReference, StageGraph};
pub use directories::MAX_DIR_NAME_LEN;
pub use manifest::StageRecord;
pub use path::{PathResolver, StagePath};
pub use stage::{Escalation, Stage, StageId, StageSpec, DONE_MARKER};
pub use traversal::DfsStages;
