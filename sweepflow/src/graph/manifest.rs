//! Stage records for the scraping collaborator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{StageGraph, StageId};
use crate::core::{StageKind, StageStatus};

/// What the manifest records about one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Arena id.
    pub id: StageId,
    /// Stage kind.
    pub kind: StageKind,
    /// Canonical name.
    pub name: String,
    /// Assigned directory.
    pub directory: Option<PathBuf>,
    /// Rendered argument list, resolved where possible.
    pub args: Vec<String>,
    /// Parameter fingerprint.
    pub fingerprint: String,
    /// Status at the time of recording.
    pub status: StageStatus,
    /// Queue job id, if submitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl StageGraph {
    /// Lists every non-root stage in dependency order with its rendered
    /// parameters.
    #[must_use]
    pub fn manifest(&self) -> Vec<StageRecord> {
        self.dfs_stages(StageId::ROOT)
            .filter(|s| s.kind() != StageKind::Root)
            .map(|stage| StageRecord {
                id: stage.id(),
                kind: stage.kind(),
                name: stage.name(),
                directory: stage.directory().map(PathBuf::from),
                args: stage
                    .params()
                    .get_args(self)
                    .unwrap_or_else(|_| stage.params().get_args_preview()),
                fingerprint: stage.params().fingerprint(),
                status: stage.status(),
                job_id: stage.job_id().map(ToString::to_string),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{StagePath, StageSpec};
    use std::path::Path;

    #[test]
    fn test_manifest_resolves_paths_once_assigned() {
        let mut graph = StageGraph::new();
        let train = graph
            .add_experiment(StageSpec::experiment(crate::params! { "model" => "a" }))
            .unwrap();
        let test = graph
            .add_stage(StageSpec::experiment(
                crate::params! { "eval" => true, "modelIn" => StagePath::new(train, "model.binary.gz") },
            ))
            .unwrap();
        graph.add_prereq(test, train).unwrap();

        let before = graph.manifest();
        assert_eq!(before.len(), 2);
        assert_eq!(before[1].args[3], format!("<stage{train}>/model.binary.gz"));

        graph.freeze().unwrap();
        graph.assign_directories(Path::new("/exp")).unwrap();
        let after = graph.manifest();
        assert_eq!(after[1].args, vec!["--eval", "True", "--modelIn", "/exp/model_a/model.binary.gz"]);
        assert_eq!(after[0].directory.as_deref(), Some(Path::new("/exp/model_a")));
        assert_eq!(after[1].name, "eval_True");
    }
}
