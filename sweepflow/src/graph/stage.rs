//! Stages and their specifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::{StageKind, StageStatus};
use crate::params::ParamSet;

/// Marker file the rendered script writes after a successful run.
pub const DONE_MARKER: &str = "DONE";

/// Index of a stage in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(pub usize);

impl StageId {
    /// The root sentinel of every graph.
    pub const ROOT: Self = Self(0);

    /// Returns the arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies a stage as one rung of an out-of-memory escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Escalation {
    /// The stage the ladder was built from.
    pub base: StageId,
    /// 1-based rung; higher rungs get more memory.
    pub tier: usize,
}

/// Everything needed to add a stage to a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// The stage kind.
    pub kind: StageKind,
    /// The composed parameters.
    pub params: ParamSet,
    /// The executable's entry point (main class or command).
    pub entry_point: Option<String>,
    /// Artifact whose presence marks the stage as already done.
    pub output: Option<String>,
    /// Set on escalation variants.
    pub escalation: Option<Escalation>,
}

impl StageSpec {
    /// Creates an experiment stage specification.
    #[must_use]
    pub fn experiment(params: ParamSet) -> Self {
        Self {
            kind: StageKind::Experiment,
            params,
            entry_point: None,
            output: Some(DONE_MARKER.to_string()),
            escalation: None,
        }
    }

    /// Creates a scrape stage specification running `command`.
    /// Scrapes always rerun, so they declare no output.
    #[must_use]
    pub fn scrape(params: ParamSet, command: impl Into<String>) -> Self {
        Self {
            kind: StageKind::Scrape,
            params,
            entry_point: Some(command.into()),
            output: None,
            escalation: None,
        }
    }

    /// Sets the entry point.
    #[must_use]
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    /// Sets the artifact used for memoization.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Disables memoization for the stage.
    #[must_use]
    pub fn without_output(mut self) -> Self {
        self.output = None;
        self
    }
}

/// One schedulable unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub(crate) id: StageId,
    pub(crate) kind: StageKind,
    pub(crate) params: ParamSet,
    pub(crate) entry_point: Option<String>,
    pub(crate) output: Option<String>,
    pub(crate) escalation: Option<Escalation>,
    pub(crate) prereqs: Vec<StageId>,
    pub(crate) dependents: Vec<StageId>,
    pub(crate) status: StageStatus,
    pub(crate) directory: Option<PathBuf>,
    pub(crate) job_id: Option<String>,
}

impl Stage {
    pub(crate) fn from_spec(id: StageId, spec: StageSpec) -> Self {
        Self {
            id,
            kind: spec.kind,
            params: spec.params,
            entry_point: spec.entry_point,
            output: spec.output,
            escalation: spec.escalation,
            prereqs: Vec::new(),
            dependents: Vec::new(),
            status: StageStatus::Pending,
            directory: None,
            job_id: None,
        }
    }

    pub(crate) fn root() -> Self {
        Self::from_spec(
            StageId::ROOT,
            StageSpec {
                kind: StageKind::Root,
                params: ParamSet::new(),
                entry_point: None,
                output: None,
                escalation: None,
            },
        )
    }

    /// Returns the stage id.
    #[must_use]
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Returns the stage kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Returns the composed parameters.
    #[must_use]
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    /// Returns the canonical name.
    #[must_use]
    pub fn name(&self) -> String {
        self.params.get_name()
    }

    /// Returns the entry point.
    #[must_use]
    pub fn entry_point(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    /// Returns the memoization artifact.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Returns the escalation marker, if this is an escalation variant.
    #[must_use]
    pub fn escalation(&self) -> Option<Escalation> {
        self.escalation
    }

    /// Returns the prerequisites, in link order.
    #[must_use]
    pub fn prereqs(&self) -> &[StageId] {
        &self.prereqs
    }

    /// Returns the dependents, in link order.
    #[must_use]
    pub fn dependents(&self) -> &[StageId] {
        &self.dependents
    }

    /// Returns the execution status.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    /// Returns the assigned directory.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Returns the queue job id once submitted.
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Returns a label for logs: the directory name if assigned, else the id.
    #[must_use]
    pub fn label(&self) -> String {
        self.directory
            .as_deref()
            .and_then(Path::file_name)
            .map_or_else(|| self.id.to_string(), |n| n.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_display() {
        assert_eq!(StageId(7).to_string(), "#7");
        assert_eq!(StageId::ROOT.index(), 0);
    }

    #[test]
    fn test_spec_defaults() {
        let spec = StageSpec::experiment(crate::params! { "a" => 1 });
        assert_eq!(spec.kind, StageKind::Experiment);
        assert_eq!(spec.output.as_deref(), Some(DONE_MARKER));

        let scrape = StageSpec::scrape(ParamSet::new(), "scrape-results");
        assert_eq!(scrape.output, None);
        assert_eq!(scrape.entry_point.as_deref(), Some("scrape-results"));
    }

    #[test]
    fn test_label_prefers_directory() {
        let mut stage = Stage::from_spec(StageId(3), StageSpec::experiment(ParamSet::new()));
        assert_eq!(stage.label(), "#3");
        stage.directory = Some(PathBuf::from("/exp/dp/a_1"));
        assert_eq!(stage.label(), "a_1");
    }
}
