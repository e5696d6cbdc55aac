//! Rendering, memoization and submission of a frozen stage graph.
//!
//! The [`Runner`] walks the graph once in dependency order. Each stage is
//! either blocked by a prerequisite, held as an unselected escalation
//! variant, skipped because its output exists, or rendered to `run.sh`
//! and handed to a [`QueueSubmitter`].

mod engine;
mod memo;
mod report;
mod script;
mod submit;

pub use engine::{Runner, MANIFEST_NAME};
pub use memo::{FsMemoStore, InMemoryMemoStore, MemoStore};
pub use report::{RunReport, StageOutcome, StageReport};
pub use script::{job_name, quote, ScriptRenderer, SCRIPT_NAME, STDERR_LOG, STDOUT_LOG};
pub use submit::{
    parse_job_id, LocalSubmitter, QueueSubmitter, SgeSubmitter, SubmitOutcome, SubmitRequest,
};

#[cfg(test)]
pub use submit::MockQueueSubmitter;
