//! Directory assignment.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use super::{StageGraph, StageId};
use crate::core::StageKind;
use crate::errors::GraphError;

/// Longest directory name kept verbatim.
pub const MAX_DIR_NAME_LEN: usize = 200;

const HASH_SUFFIX_LEN: usize = 16;

impl StageGraph {
    /// Gives every stage its own directory under `experiment_root`.
    ///
    /// Stages are visited in dependency order, so the collision suffixes
    /// (`_1`, `_2`, ...) depend only on the graph. Stages that already have
    /// a directory keep it, which makes repeated calls a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is not frozen.
    pub fn assign_directories(&mut self, experiment_root: &Path) -> Result<(), GraphError> {
        if !self.frozen {
            return Err(GraphError::not_frozen("assign directories"));
        }

        let order: Vec<StageId> = self.dfs_stages(StageId::ROOT).map(|s| s.id()).collect();
        let mut taken: HashSet<String> = self
            .iter()
            .filter(|s| s.kind() != StageKind::Root)
            .filter_map(|s| s.directory())
            .filter_map(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .collect();

        for id in order {
            let stage = self.get_mut(id)?;
            if stage.directory.is_some() {
                continue;
            }
            if stage.kind == StageKind::Root {
                stage.directory = Some(experiment_root.to_path_buf());
                continue;
            }

            let base = directory_name(stage.kind, &stage.params.get_name());
            let mut candidate = base.clone();
            let mut suffix = 1;
            while taken.contains(&candidate) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            taken.insert(candidate.clone());

            let dir = experiment_root.join(&candidate);
            debug!(stage = %id, dir = %dir.display(), "Assigned stage directory");
            stage.directory = Some(dir);
        }
        Ok(())
    }
}

fn directory_name(kind: StageKind, name: &str) -> String {
    let raw = match (kind, name.is_empty()) {
        (StageKind::Scrape, true) => "scrape".to_string(),
        (StageKind::Scrape, false) => format!("scrape_{name}"),
        (_, true) => "stage".to_string(),
        (_, false) => name.to_string(),
    };
    if raw.len() <= MAX_DIR_NAME_LEN {
        return raw;
    }

    let digest = Sha256::digest(raw.as_bytes());
    let hash = hex::encode(digest);
    // Names are sanitized to ASCII, so byte slicing is safe.
    let keep = MAX_DIR_NAME_LEN - HASH_SUFFIX_LEN - 1;
    format!("{}_{}", &raw[..keep], &hash[..HASH_SUFFIX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StageSpec;
    use crate::params::ParamSet;
    use crate::testing::diamond_graph;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn dir_name(graph: &StageGraph, id: StageId) -> String {
        graph.get(id).unwrap().label()
    }

    #[test]
    fn test_requires_frozen_graph() {
        let (mut graph, _) = diamond_graph().unwrap();
        assert!(matches!(
            graph.assign_directories(Path::new("/exp")),
            Err(GraphError::NotFrozen { .. })
        ));
    }

    #[test]
    fn test_root_gets_experiment_root() {
        let (mut graph, [a, ..]) = diamond_graph().unwrap();
        graph.freeze().unwrap();
        graph.assign_directories(Path::new("/exp/dp")).unwrap();
        assert_eq!(graph.get(StageId::ROOT).unwrap().directory(), Some(Path::new("/exp/dp")));
        assert_eq!(
            graph.get(a).unwrap().directory().map(Path::to_path_buf),
            Some(PathBuf::from("/exp/dp/name_a"))
        );
    }

    #[test]
    fn test_collisions_get_deterministic_suffixes() {
        let build = || {
            let mut graph = StageGraph::new();
            let ids: Vec<_> = (0..3)
                .map(|_| graph.add_experiment(StageSpec::experiment(crate::params! { "x" => 1 })).unwrap())
                .collect();
            let empty = graph.add_experiment(StageSpec::experiment(ParamSet::new())).unwrap();
            graph.freeze().unwrap();
            graph.assign_directories(Path::new("/exp")).unwrap();
            (graph, ids, empty)
        };

        let (graph, ids, empty) = build();
        let names: Vec<_> = ids.iter().map(|id| dir_name(&graph, *id)).collect();
        assert_eq!(names, vec!["x_1", "x_1_1", "x_1_2"]);
        assert_eq!(dir_name(&graph, empty), "stage");

        let (again, _, _) = build();
        for id in ids {
            assert_eq!(dir_name(&again, id), dir_name(&graph, id));
        }
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let (mut graph, ids) = diamond_graph().unwrap();
        graph.freeze().unwrap();
        graph.assign_directories(Path::new("/exp")).unwrap();
        let first: Vec<_> = ids.iter().map(|id| dir_name(&graph, *id)).collect();
        graph.assign_directories(Path::new("/exp")).unwrap();
        let second: Vec<_> = ids.iter().map(|id| dir_name(&graph, *id)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_long_names_are_truncated_with_hash() {
        let long = "v".repeat(400);
        let name = directory_name(StageKind::Experiment, &long);
        assert_eq!(name.len(), MAX_DIR_NAME_LEN);
        assert_ne!(name, directory_name(StageKind::Experiment, &"v".repeat(401)));
    }

    #[test]
    fn test_scrape_prefix() {
        assert_eq!(directory_name(StageKind::Scrape, ""), "scrape");
        assert_eq!(directory_name(StageKind::Scrape, "a_1"), "scrape_a_1");
    }
}
