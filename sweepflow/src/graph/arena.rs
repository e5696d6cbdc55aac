//! The stage arena and its edge operations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use tracing::debug;

use super::{DfsStages, PathResolver, Stage, StageId, StagePath, StageSpec};
use crate::core::{StageKind, StageStatus};
use crate::errors::{CycleDetectedError, GraphError, UnresolvedReferenceError};
use crate::params::ParamSet;

/// A stage path that resolved during the reference phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// The stage holding the reference.
    pub holder: StageId,
    /// The parameter key holding it.
    pub key: String,
    /// The referenced stage.
    pub target: StageId,
    /// The resolved absolute path.
    pub path: PathBuf,
}

/// A DAG of stages stored in an arena and addressed by [`StageId`].
///
/// The graph always contains a root at [`StageId::ROOT`]. Removed stages
/// leave a tombstone so ids stay stable.
#[derive(Debug, Clone)]
pub struct StageGraph {
    pub(crate) stages: Vec<Option<Stage>>,
    pub(crate) frozen: bool,
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StageGraph {
    /// Creates a graph holding only the root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: vec![Some(Stage::root())],
            frozen: false,
        }
    }

    /// Returns the root id.
    #[must_use]
    pub fn root(&self) -> StageId {
        StageId::ROOT
    }

    /// Returns the number of live stages, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.iter().flatten().count()
    }

    /// Returns true if only the root is left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Returns true once [`freeze`](Self::freeze) succeeded.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Looks up a live stage.
    #[must_use]
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.index()).and_then(Option::as_ref)
    }

    /// Looks up a live stage or fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unknown or removed.
    pub fn get(&self, id: StageId) -> Result<&Stage, GraphError> {
        self.stage(id).ok_or(GraphError::UnknownStage(id))
    }

    pub(crate) fn get_mut(&mut self, id: StageId) -> Result<&mut Stage, GraphError> {
        self.stages
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownStage(id))
    }

    /// Iterates over live stages in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().flatten()
    }

    /// Returns the parameters of a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unknown.
    pub fn params(&self, id: StageId) -> Result<&ParamSet, GraphError> {
        self.get(id).map(Stage::params)
    }

    /// Returns the parameters of a stage for editing.
    ///
    /// # Errors
    ///
    /// Returns an error once frozen, for the root, or for an unknown id.
    pub fn params_mut(&mut self, id: StageId) -> Result<&mut ParamSet, GraphError> {
        self.ensure_mutable("edit parameters")?;
        if id == StageId::ROOT {
            return Err(GraphError::RootImmutable("given parameters".to_string()));
        }
        Ok(&mut self.get_mut(id)?.params)
    }

    fn ensure_mutable(&self, operation: &str) -> Result<(), GraphError> {
        if self.frozen {
            return Err(GraphError::frozen(operation));
        }
        Ok(())
    }

    /// Adds a detached stage.
    ///
    /// # Errors
    ///
    /// Returns an error once frozen.
    pub fn add_stage(&mut self, spec: StageSpec) -> Result<StageId, GraphError> {
        self.ensure_mutable("add a stage")?;
        if spec.kind == StageKind::Root {
            return Err(GraphError::RootImmutable("duplicated".to_string()));
        }
        let id = StageId(self.stages.len());
        self.stages.push(Some(Stage::from_spec(id, spec)));
        Ok(id)
    }

    /// Adds an experiment stage under the root.
    ///
    /// # Errors
    ///
    /// Returns an error once frozen.
    pub fn add_experiment(&mut self, spec: StageSpec) -> Result<StageId, GraphError> {
        let id = self.add_stage(spec)?;
        self.add_prereq(id, StageId::ROOT)?;
        Ok(id)
    }

    /// Adds a scrape stage that waits on every given stage.
    ///
    /// # Errors
    ///
    /// Returns an error once frozen or if a prerequisite is unknown.
    pub fn add_scrape_stage<I>(&mut self, spec: StageSpec, prereqs: I) -> Result<StageId, GraphError>
    where
        I: IntoIterator<Item = StageId>,
    {
        let id = self.add_stage(spec)?;
        self.add_prereqs(id, prereqs)?;
        Ok(id)
    }

    /// Makes `prereq` a prerequisite of `stage` (and `stage` a dependent
    /// of `prereq`). Repeated links are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error once frozen, for unknown ids, if `stage` is the
    /// root, or if the edge would close a cycle.
    pub fn add_prereq(&mut self, stage: StageId, prereq: StageId) -> Result<(), GraphError> {
        self.ensure_mutable("link stages")?;
        self.get(stage)?;
        self.get(prereq)?;
        if stage == StageId::ROOT {
            return Err(GraphError::RootImmutable("given prerequisites".to_string()));
        }
        if stage == prereq {
            return Err(CycleDetectedError::new(vec![stage, stage]).into());
        }
        if self.get(stage)?.prereqs.contains(&prereq) {
            return Ok(());
        }
        if let Some(mut path) = self.find_path(stage, prereq) {
            // prereq -> stage closes stage -> ... -> prereq.
            path.insert(0, prereq);
            return Err(CycleDetectedError::new(path).into());
        }

        self.get_mut(stage)?.prereqs.push(prereq);
        self.get_mut(prereq)?.dependents.push(stage);
        Ok(())
    }

    /// Makes `dependent` depend on `stage`.
    ///
    /// # Errors
    ///
    /// See [`add_prereq`](Self::add_prereq).
    pub fn add_dependent(&mut self, stage: StageId, dependent: StageId) -> Result<(), GraphError> {
        self.add_prereq(dependent, stage)
    }

    /// Adds several prerequisites in order.
    ///
    /// # Errors
    ///
    /// See [`add_prereq`](Self::add_prereq).
    pub fn add_prereqs<I>(&mut self, stage: StageId, prereqs: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = StageId>,
    {
        for prereq in prereqs {
            self.add_prereq(stage, prereq)?;
        }
        Ok(())
    }

    /// Adds several dependents in order.
    ///
    /// # Errors
    ///
    /// See [`add_prereq`](Self::add_prereq).
    pub fn add_dependents<I>(&mut self, stage: StageId, dependents: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = StageId>,
    {
        for dependent in dependents {
            self.add_prereq(dependent, stage)?;
        }
        Ok(())
    }

    /// Follows dependent edges from `from` looking for `to`.
    fn find_path(&self, from: StageId, to: StageId) -> Option<Vec<StageId>> {
        let mut parent: HashMap<StageId, StageId> = HashMap::new();
        let mut seen: HashSet<StageId> = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to];
                let mut cursor = to;
                while let Some(prev) = parent.get(&cursor) {
                    path.push(*prev);
                    cursor = *prev;
                }
                path.reverse();
                return Some(path);
            }
            let Some(stage) = self.stage(current) else {
                continue;
            };
            for next in &stage.dependents {
                if seen.insert(*next) {
                    parent.insert(*next, current);
                    queue.push_back(*next);
                }
            }
        }
        None
    }

    /// Returns every stage reachable from `start` through dependent edges.
    #[must_use]
    pub fn reachable_from(&self, start: StageId) -> HashSet<StageId> {
        let mut seen = HashSet::new();
        if self.stage(start).is_none() {
            return seen;
        }
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(stage) = self.stage(current) {
                stack.extend(stage.dependents.iter().copied());
            }
        }
        seen
    }

    /// Walks the stages reachable from `start` in dependency order.
    #[must_use]
    pub fn dfs_stages(&self, start: StageId) -> DfsStages<'_> {
        DfsStages::new(self, start)
    }

    /// Removes a stage and every dependent reachable only through it.
    /// A dependent survives while any of its prerequisites survives.
    /// Returns the removed ids, the given stage first.
    ///
    /// # Errors
    ///
    /// Returns an error once frozen, for the root, or for an unknown id.
    pub fn remove_stage(&mut self, id: StageId) -> Result<Vec<StageId>, GraphError> {
        self.ensure_mutable("remove a stage")?;
        if id == StageId::ROOT {
            return Err(GraphError::RootImmutable("removed".to_string()));
        }
        self.get(id)?;

        let mut pending: Vec<StageId> = self.reachable_from(id).into_iter().filter(|s| *s != id).collect();
        pending.sort();
        let mut doomed: HashSet<StageId> = HashSet::from([id]);
        let mut removed = vec![id];
        loop {
            let before = removed.len();
            pending.retain(|candidate| {
                let exclusive = self
                    .stage(*candidate)
                    .is_some_and(|s| s.prereqs.iter().all(|p| doomed.contains(p)));
                if exclusive {
                    doomed.insert(*candidate);
                    removed.push(*candidate);
                }
                !exclusive
            });
            if removed.len() == before {
                break;
            }
        }

        for stage in &removed {
            self.unlink(*stage);
        }
        debug!(stage = %id, removed = removed.len(), "Removed stage subtree");
        Ok(removed)
    }

    fn unlink(&mut self, id: StageId) {
        let Some(stage) = self.stages.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        for prereq in &stage.prereqs {
            if let Some(Some(p)) = self.stages.get_mut(prereq.index()) {
                p.dependents.retain(|d| *d != id);
            }
        }
        for dependent in &stage.dependents {
            if let Some(Some(d)) = self.stages.get_mut(dependent.index()) {
                d.prereqs.retain(|p| *p != id);
            }
        }
    }

    /// Keeps only the first `keep` dependents of `stage`, removing the
    /// others as by [`remove_stage`](Self::remove_stage).
    ///
    /// # Errors
    ///
    /// Returns an error once frozen or for an unknown id.
    pub fn truncate_dependents(&mut self, stage: StageId, keep: usize) -> Result<Vec<StageId>, GraphError> {
        self.ensure_mutable("truncate dependents")?;
        let dropped: Vec<StageId> = self.get(stage)?.dependents.iter().skip(keep).copied().collect();
        let mut removed = Vec::new();
        for id in dropped {
            if self.stage(id).is_some() {
                removed.extend(self.remove_stage(id)?);
            }
        }
        Ok(removed)
    }

    /// Checks every stage hangs off the root and forbids further changes.
    ///
    /// # Errors
    ///
    /// Returns an error listing any stage not reachable from the root.
    pub fn freeze(&mut self) -> Result<(), GraphError> {
        if self.frozen {
            return Ok(());
        }
        let reachable = self.reachable_from(StageId::ROOT);
        let orphans: Vec<StageId> = self
            .iter()
            .map(Stage::id)
            .filter(|id| !reachable.contains(id))
            .collect();
        if !orphans.is_empty() {
            return Err(GraphError::unreachable(orphans));
        }
        self.frozen = true;
        debug!(stages = self.len(), "Froze stage graph");
        Ok(())
    }

    /// Records a status change.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown id.
    pub fn set_status(&mut self, id: StageId, status: StageStatus) -> Result<(), GraphError> {
        self.get_mut(id)?.status = status;
        Ok(())
    }

    pub(crate) fn set_job_id(&mut self, id: StageId, job_id: Option<String>) -> Result<(), GraphError> {
        self.get_mut(id)?.job_id = job_id;
        Ok(())
    }

    /// Resolves every stage path held by any stage.
    ///
    /// # Errors
    ///
    /// Returns the first reference whose target has no directory.
    pub fn resolve_references(&self) -> Result<Vec<ResolvedReference>, UnresolvedReferenceError> {
        let mut resolved = Vec::new();
        for stage in self.iter() {
            for (key, path) in stage.params.paths() {
                resolved.push(ResolvedReference {
                    holder: stage.id,
                    key: key.to_string(),
                    target: path.stage(),
                    path: self.resolve(path)?,
                });
            }
        }
        Ok(resolved)
    }
}

impl PathResolver for StageGraph {
    fn resolve(&self, path: &StagePath) -> Result<PathBuf, UnresolvedReferenceError> {
        self.stage(path.stage())
            .and_then(Stage::directory)
            .map(|dir| dir.join(path.file()))
            .ok_or_else(|| UnresolvedReferenceError::new(path.stage(), path.file()))
    }
}
