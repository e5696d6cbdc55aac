//! Dependency-ordered traversal.

use std::collections::{HashMap, HashSet};

use super::{Stage, StageGraph, StageId};

/// Depth-first, prerequisite-respecting walk over the stages reachable
/// from a start stage.
///
/// A stage is yielded once all of its prerequisites inside the walked
/// region have been yielded, and every stage is yielded exactly once even
/// when several paths lead to it. Among ready stages the walk goes deep
/// first, following each stage's dependents in link order.
#[derive(Debug, Clone)]
pub struct DfsStages<'a> {
    graph: &'a StageGraph,
    start: StageId,
    pending: HashMap<StageId, usize>,
    stack: Vec<StageId>,
}

impl<'a> DfsStages<'a> {
    pub(crate) fn new(graph: &'a StageGraph, start: StageId) -> Self {
        let mut walk = Self {
            graph,
            start,
            pending: HashMap::new(),
            stack: Vec::new(),
        };
        walk.restart();
        walk
    }

    /// Rewinds the walk to its start.
    pub fn restart(&mut self) {
        let region: HashSet<StageId> = self.graph.reachable_from(self.start);
        self.pending = region
            .iter()
            .filter_map(|id| self.graph.stage(*id))
            .map(|stage| {
                let inside = stage.prereqs().iter().filter(|p| region.contains(p)).count();
                (stage.id(), inside)
            })
            .collect();
        self.stack.clear();
        if region.contains(&self.start) {
            self.stack.push(self.start);
        }
    }
}

impl<'a> Iterator for DfsStages<'a> {
    type Item = &'a Stage;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let stage = self.graph.stage(id)?;
        // Pushed in reverse so the first dependent is walked first.
        for dependent in stage.dependents().iter().rev() {
            if let Some(count) = self.pending.get_mut(dependent) {
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        self.stack.push(*dependent);
                    }
                }
            }
        }
        Some(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chain_graph, diamond_graph};
    use pretty_assertions::assert_eq;

    fn ids<'a>(walk: impl Iterator<Item = &'a Stage>) -> Vec<StageId> {
        walk.map(Stage::id).collect()
    }

    #[test]
    fn test_chain_order() {
        let (graph, [a, b, c]) = chain_graph().unwrap();
        assert_eq!(ids(graph.dfs_stages(StageId::ROOT)), vec![StageId::ROOT, a, b, c]);
        assert_eq!(ids(graph.dfs_stages(b)), vec![b, c]);
    }

    #[test]
    fn test_diamond_join_visited_once_after_both_branches() {
        let (graph, [a, b, c, d]) = diamond_graph().unwrap();
        let order = ids(graph.dfs_stages(StageId::ROOT));
        assert_eq!(order, vec![StageId::ROOT, a, b, c, d]);
    }

    #[test]
    fn test_depth_first_among_siblings() {
        let mut graph = StageGraph::new();
        let spec = || crate::graph::StageSpec::experiment(crate::params::ParamSet::new());
        let x = graph.add_experiment(spec()).unwrap();
        let y = graph.add_experiment(spec()).unwrap();
        let x1 = graph.add_stage(spec()).unwrap();
        graph.add_dependent(x, x1).unwrap();

        let order = ids(graph.dfs_stages(StageId::ROOT));
        assert_eq!(order, vec![StageId::ROOT, x, x1, y]);
    }

    #[test]
    fn test_walk_is_restartable() {
        let (graph, _) = diamond_graph().unwrap();
        let mut walk = graph.dfs_stages(StageId::ROOT);
        let first: Vec<_> = walk.by_ref().map(Stage::id).collect();
        assert!(walk.next().is_none());
        walk.restart();
        assert_eq!(ids(walk), first);
    }

    #[test]
    fn test_unknown_start_is_empty() {
        let graph = StageGraph::new();
        assert_eq!(graph.dfs_stages(StageId(42)).count(), 0);
    }
}
