//! Stage status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The sentinel every experiment hangs off. Never rendered.
    Root,
    /// One run of the external experiment executable.
    #[default]
    Experiment,
    /// Invokes the external result scraper over finished stages.
    Scrape,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Experiment => write!(f, "experiment"),
            Self::Scrape => write!(f, "scrape"),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not been submitted.
    #[default]
    Pending,
    /// Stage is queued or running on the cluster.
    Running,
    /// Stage completed successfully.
    Succeeded,
    /// Stage failed.
    Failed,
    /// Stage output already existed, so it was not run again.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Returns true if the status indicates success (memoized counts).
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Returns true if a dependent may be handed to the queue behind this
    /// stage. Running stages qualify because the queue holds the dependent
    /// until they finish.
    #[must_use]
    pub fn admits_dependents(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped | Self::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Root.to_string(), "root");
        assert_eq!(StageKind::Experiment.to_string(), "experiment");
        assert_eq!(StageKind::Scrape.to_string(), "scrape");
    }

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
        assert_eq!(StageStatus::default(), StageStatus::Pending);
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Skipped.is_terminal());
        assert!(StageStatus::Skipped.is_success());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Running.admits_dependents());
        assert!(!StageStatus::Failed.admits_dependents());
        assert!(!StageStatus::Pending.admits_dependents());
    }

    #[test]
    fn test_stage_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Skipped).unwrap();
        assert_eq!(json, r#""skipped""#);

        let deserialized: StageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageStatus::Skipped);
    }
}
