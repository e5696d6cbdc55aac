//! Run reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::core::StageStatus;
use crate::graph::StageId;

/// What the runner did with one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The artifact already existed.
    Memoized,
    /// The script was written but not submitted.
    Rendered,
    /// The queue accepted the job.
    Submitted {
        /// Queue job id.
        job_id: String,
    },
    /// The stage ran to completion during the walk.
    Completed,
    /// A prerequisite failed or was never submitted.
    Blocked {
        /// The prerequisites that blocked it.
        on: Vec<StageId>,
    },
    /// An escalation variant nobody selected.
    Held,
    /// Planning, rendering or submission failed.
    Failed {
        /// Why.
        reason: String,
    },
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memoized => write!(f, "memoized"),
            Self::Rendered => write!(f, "rendered"),
            Self::Submitted { job_id } => write!(f, "submitted as {job_id}"),
            Self::Completed => write!(f, "completed"),
            Self::Blocked { on } => write!(f, "blocked on {} prerequisite(s)", on.len()),
            Self::Held => write!(f, "held for escalation"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// The report line of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Arena id.
    pub id: StageId,
    /// Directory name or id.
    pub label: String,
    /// Stage directory.
    pub directory: Option<PathBuf>,
    /// Final status.
    pub status: StageStatus,
    /// What happened.
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Result of one runner invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this invocation.
    pub run_id: String,
    /// Directory holding every stage directory.
    pub experiment_dir: PathBuf,
    /// Whether submission was skipped.
    pub dry_run: bool,
    /// One entry per non-root stage, in walk order.
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Returns the report of one stage.
    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Returns the outcome of one stage.
    #[must_use]
    pub fn outcome(&self, id: StageId) -> Option<&StageOutcome> {
        self.stage(id).map(|s| &s.outcome)
    }

    /// Counts stages whose outcome matches.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&StageOutcome) -> bool) -> usize {
        self.stages.iter().filter(|s| predicate(&s.outcome)).count()
    }

    /// Returns the stages that failed.
    #[must_use]
    pub fn failed(&self) -> Vec<&StageReport> {
        self.stages
            .iter()
            .filter(|s| matches!(s.outcome, StageOutcome::Failed { .. }))
            .collect()
    }

    /// Returns true if nothing failed or was blocked.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.count(|o| matches!(o, StageOutcome::Failed { .. } | StageOutcome::Blocked { .. })) == 0
    }

    /// One line per outcome kind, for the end-of-run log.
    #[must_use]
    pub fn summary(&self) -> String {
        let submitted = self.count(|o| matches!(o, StageOutcome::Submitted { .. } | StageOutcome::Completed));
        let rendered = self.count(|o| matches!(o, StageOutcome::Rendered));
        let memoized = self.count(|o| matches!(o, StageOutcome::Memoized));
        let held = self.count(|o| matches!(o, StageOutcome::Held));
        let blocked = self.count(|o| matches!(o, StageOutcome::Blocked { .. }));
        let failed = self.failed().len();
        format!(
            "{} stages: {submitted} submitted, {rendered} rendered, {memoized} memoized, {held} held, {blocked} blocked, {failed} failed",
            self.stages.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line(id: usize, outcome: StageOutcome, status: StageStatus) -> StageReport {
        StageReport {
            id: StageId(id),
            label: format!("s{id}"),
            directory: None,
            status,
            outcome,
        }
    }

    #[test]
    fn test_summary_and_success() {
        let report = RunReport {
            run_id: "r".to_string(),
            experiment_dir: PathBuf::from("/exp"),
            dry_run: false,
            stages: vec![
                line(1, StageOutcome::Memoized, StageStatus::Skipped),
                line(2, StageOutcome::Submitted { job_id: "7".to_string() }, StageStatus::Running),
                line(3, StageOutcome::Held, StageStatus::Pending),
            ],
        };
        assert!(report.is_success());
        assert_eq!(
            report.summary(),
            "3 stages: 1 submitted, 0 rendered, 1 memoized, 1 held, 0 blocked, 0 failed"
        );
        assert_eq!(report.outcome(StageId(3)), Some(&StageOutcome::Held));
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(line(
            4,
            StageOutcome::Failed { reason: "boom".to_string() },
            StageStatus::Failed,
        ))
        .unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["reason"], "boom");
        assert_eq!(json["status"], "failed");
    }
}
