//! Error types for sweepflow.
//!
//! Construction-time problems (configuration, graph shape, unresolved
//! references) are fatal for the whole run. Resource estimation and
//! submission errors are scoped to a single stage and surface in the
//! run report instead of aborting the walk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::graph::StageId;

/// The main error type for sweepflow operations.
#[derive(Debug, Error)]
pub enum SweepflowError {
    /// Invalid experiment configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Invalid graph construction or mutation.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// A stage path was resolved before its target had a directory.
    #[error("{0}")]
    UnresolvedReference(#[from] UnresolvedReferenceError),

    /// Resource requirements could not be derived for a stage.
    #[error("{0}")]
    ResourceEstimation(#[from] ResourceEstimationError),

    /// The external queue rejected or failed a submission.
    #[error("{0}")]
    Submission(#[from] SubmissionError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SweepflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Diagnostic metadata attached to construction errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Errors in the experiment definition or driver options.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// The requested experiment name is not in the registry.
    #[error("Unknown experiment '{name}'. Known experiments: {}", known.join(", "))]
    UnknownExperiment {
        /// The requested name.
        name: String,
        /// Every registered name.
        known: Vec<String>,
    },

    /// A parameter the experiment needs was never set.
    #[error("Missing required parameter '{key}'{}", stage.as_ref().map(|s| format!(" for stage '{s}'")).unwrap_or_default())]
    MissingParameter {
        /// The parameter key.
        key: String,
        /// The stage name, when known.
        stage: Option<String>,
    },

    /// Two settings cannot be combined.
    #[error("Conflicting settings: {message}")]
    ConflictingFlags {
        /// What conflicts.
        message: String,
    },

    /// A value could not be parsed or is out of range.
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// The parameter or option name.
        key: String,
        /// Why it is invalid.
        message: String,
    },
}

impl ConfigError {
    /// Creates an unknown experiment error.
    #[must_use]
    pub fn unknown_experiment(name: impl Into<String>, known: &[&str]) -> Self {
        Self::UnknownExperiment {
            name: name.into(),
            known: known.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Creates a missing parameter error.
    #[must_use]
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingParameter {
            key: key.into(),
            stage: None,
        }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Error raised when an edge would close a cycle in the stage graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Cycle detected in stage graph: {}", render_path(cycle_path))]
pub struct CycleDetectedError {
    /// The stages forming the cycle, first and last equal.
    pub cycle_path: Vec<StageId>,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<StageId>) -> Self {
        let info = ErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Stage graph contains a dependency cycle: {}", render_path(&cycle_path)),
        )
        .with_fix_hint("Remove one of the prerequisite links in the cycle.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

fn render_path(path: &[StageId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised while building or mutating the stage graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Adding an edge would create a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),

    /// The graph was frozen and can no longer change.
    #[error("Cannot {operation}: stage graph is frozen")]
    Frozen {
        /// The attempted operation.
        operation: String,
    },

    /// The operation requires a frozen graph.
    #[error("Cannot {operation}: stage graph is not frozen yet")]
    NotFrozen {
        /// The attempted operation.
        operation: String,
    },

    /// The stage id does not refer to a live stage.
    #[error("Unknown stage {0}")]
    UnknownStage(StageId),

    /// The root stage cannot be removed or given prerequisites.
    #[error("The root stage cannot be {0}")]
    RootImmutable(String),

    /// Stages that no path from the root reaches.
    #[error("Stages not reachable from the root: {}", render_path(stages))]
    Unreachable {
        /// The orphaned stages.
        stages: Vec<StageId>,
        /// Diagnostic info.
        error_info: ErrorInfo,
    },
}

impl GraphError {
    /// Creates a frozen-graph error.
    #[must_use]
    pub fn frozen(operation: impl Into<String>) -> Self {
        Self::Frozen {
            operation: operation.into(),
        }
    }

    /// Creates a not-frozen error.
    #[must_use]
    pub fn not_frozen(operation: impl Into<String>) -> Self {
        Self::NotFrozen {
            operation: operation.into(),
        }
    }

    /// Creates an unreachable-stages error.
    #[must_use]
    pub fn unreachable(stages: Vec<StageId>) -> Self {
        let info = ErrorInfo::new("GRAPH-UNREACHABLE", "Every experiment must hang off the root")
            .with_fix_hint("Link the stage under the root or under another stage with add_dependent.");
        Self::Unreachable {
            stages,
            error_info: info,
        }
    }
}

/// Error raised when a stage path is resolved before directory assignment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unresolved reference to '{file}' in stage {stage}: the stage has no directory yet")]
pub struct UnresolvedReferenceError {
    /// The referenced stage.
    pub stage: StageId,
    /// The relative file name.
    pub file: String,
}

impl UnresolvedReferenceError {
    /// Creates a new unresolved reference error.
    #[must_use]
    pub fn new(stage: StageId, file: impl Into<String>) -> Self {
        Self {
            stage,
            file: file.into(),
        }
    }
}

/// Error raised when a memory estimate lacks the signals it needs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Cannot estimate resources for '{stage}': missing {}", missing.join(", "))]
pub struct ResourceEstimationError {
    /// The stage name.
    pub stage: String,
    /// The complexity signals that were absent.
    pub missing: Vec<String>,
}

impl ResourceEstimationError {
    /// Creates a new resource estimation error.
    #[must_use]
    pub fn new(stage: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            missing,
        }
    }

    /// Sets the stage name.
    #[must_use]
    pub fn for_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }
}

/// Error raised by a queue submitter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    /// The submission command could not be started.
    #[error("Failed to launch '{command}': {reason}")]
    Launch {
        /// The command.
        command: String,
        /// The underlying error.
        reason: String,
    },

    /// The submission command exited unsuccessfully.
    #[error("'{command}' exited with status {status}: {stderr}")]
    Rejected {
        /// The command.
        command: String,
        /// The exit status.
        status: i32,
        /// Captured stderr.
        stderr: String,
    },

    /// The queue accepted the job but the reply could not be parsed.
    #[error("Could not parse job id from queue reply: {0}")]
    UnparsedReply(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_creation() {
        let info = ErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "my_stage");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"my_stage".to_string()));
        assert_eq!(info.to_json()["code"], "TEST-001");
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![StageId(1), StageId(2), StageId(1)]);
        assert!(err.to_string().contains("#1 -> #2 -> #1"));
        assert_eq!(err.error_info.code, "GRAPH-CYCLE");
    }

    #[test]
    fn test_unknown_experiment_lists_known_names() {
        let err = ConfigError::unknown_experiment("dp-nope", &["dp-opt", "dp-cll"]);
        let msg = err.to_string();
        assert!(msg.contains("dp-nope"));
        assert!(msg.contains("dp-opt, dp-cll"));
    }

    #[test]
    fn test_missing_parameter_message() {
        let err = ConfigError::MissingParameter {
            key: "train".to_string(),
            stage: Some("dp".to_string()),
        };
        assert_eq!(err.to_string(), "Missing required parameter 'train' for stage 'dp'");
        assert_eq!(
            ConfigError::missing("train").to_string(),
            "Missing required parameter 'train'"
        );
    }

    #[test]
    fn test_errors_convert_into_sweepflow_error() {
        let err: SweepflowError = UnresolvedReferenceError::new(StageId(3), "model.binary.gz").into();
        assert!(matches!(err, SweepflowError::UnresolvedReference(_)));

        let err: SweepflowError = GraphError::frozen("add edge").into();
        assert_eq!(err.to_string(), "Cannot add edge: stage graph is frozen");
    }
}
