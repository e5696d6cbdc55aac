//! The render and submit walk.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::memo::{FsMemoStore, MemoStore};
use super::report::{RunReport, StageOutcome, StageReport};
use super::script::{job_name, ScriptRenderer, SCRIPT_NAME};
use super::submit::{LocalSubmitter, QueueSubmitter, SgeSubmitter, SubmitOutcome, SubmitRequest};
use crate::config::RunnerConfig;
use crate::core::{StageKind, StageStatus};
use crate::errors::{SweepflowError, UnresolvedReferenceError};
use crate::events::{EventSink, LoggingEventSink, RunEventKind};
use crate::graph::{Stage, StageGraph, StageId, StageRecord};
use crate::resources::ResourcePlanner;
use crate::utils::{format_timestamp, generate_run_id, iso_timestamp, Timestamp};

/// File the runner writes into the experiment directory.
pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    run_id: &'a str,
    started_at: String,
    created_at: String,
    experiment_dir: &'a Path,
    dry_run: bool,
    stages: Vec<StageRecord>,
}

/// Renders and submits every stage of a graph.
pub struct Runner {
    config: RunnerConfig,
    planner: ResourcePlanner,
    renderer: ScriptRenderer,
    submitter: Arc<dyn QueueSubmitter>,
    memo: Arc<dyn MemoStore>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("planner", &self.planner)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Creates a runner. Stages go to the configured queue, or run
    /// locally when there is none.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        let planner = ResourcePlanner::new(config.resources.clone()).with_queue(config.queue.clone());
        let submitter: Arc<dyn QueueSubmitter> = if config.queue.is_some() {
            Arc::new(SgeSubmitter::default())
        } else {
            Arc::new(LocalSubmitter)
        };
        Self {
            renderer: ScriptRenderer::new(&config),
            planner,
            submitter,
            memo: Arc::new(FsMemoStore),
            events: Arc::new(LoggingEventSink::default()),
            config,
        }
    }

    /// Replaces the resource planner.
    #[must_use]
    pub fn with_planner(mut self, planner: ResourcePlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Replaces the submission backend.
    #[must_use]
    pub fn with_submitter(mut self, submitter: Arc<dyn QueueSubmitter>) -> Self {
        self.submitter = submitter;
        self
    }

    /// Replaces the memoization backend.
    #[must_use]
    pub fn with_memo_store(mut self, memo: Arc<dyn MemoStore>) -> Self {
        self.memo = memo;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Freezes the graph if needed, assigns directories under
    /// `experiment_dir`, resolves references and walks every stage.
    ///
    /// Per-stage problems end up in the report. Only construction errors
    /// and filesystem failures abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is invalid, a reference does not
    /// resolve, or a script or the manifest cannot be written.
    pub fn run(&self, graph: &mut StageGraph, experiment_dir: &Path) -> Result<RunReport, SweepflowError> {
        graph.freeze()?;
        graph.assign_directories(experiment_dir)?;
        let references = graph.resolve_references()?;
        debug!(references = references.len(), "Resolved stage references");

        std::fs::create_dir_all(experiment_dir)?;
        let started_at = chrono::Utc::now();
        let run_id = generate_run_id().to_string();
        info!(
            run_id = %run_id,
            dir = %experiment_dir.display(),
            stages = graph.len() - 1,
            dry_run = self.config.dry_run,
            "Starting run"
        );

        let order: Vec<StageId> = graph.dfs_stages(StageId::ROOT).map(Stage::id).collect();
        let mut rendered: HashSet<StageId> = HashSet::new();
        let mut stages = Vec::with_capacity(order.len());

        for id in order {
            let stage = graph.get(id)?.clone();
            if stage.kind() == StageKind::Root {
                graph.set_status(id, StageStatus::Succeeded)?;
                continue;
            }
            let outcome = self.visit(graph, &stage, &mut rendered)?;
            let updated = graph.get(id)?;
            stages.push(StageReport {
                id,
                label: updated.label(),
                directory: updated.directory().map(PathBuf::from),
                status: updated.status(),
                outcome,
            });
        }

        let report = RunReport {
            run_id,
            experiment_dir: experiment_dir.to_path_buf(),
            dry_run: self.config.dry_run,
            stages,
        };
        self.write_manifest(graph, &report, &started_at)?;

        let summary = report.summary();
        info!(run_id = %report.run_id, "{}", summary);
        self.events.emit(
            RunEventKind::RunCompleted,
            serde_json::json!({ "run_id": report.run_id, "summary": summary }),
        );
        Ok(report)
    }

    fn visit(
        &self,
        graph: &mut StageGraph,
        stage: &Stage,
        rendered: &mut HashSet<StageId>,
    ) -> Result<StageOutcome, SweepflowError> {
        let id = stage.id();
        let label = stage.label();
        let dir = stage
            .directory()
            .map(Path::to_path_buf)
            .ok_or_else(|| UnresolvedReferenceError::new(id, SCRIPT_NAME))?;

        let mut blockers = Vec::new();
        for prereq in stage.prereqs() {
            let admits = graph.get(*prereq)?.status().admits_dependents() || rendered.contains(prereq);
            if !admits {
                blockers.push(*prereq);
            }
        }
        if !blockers.is_empty() {
            debug!(stage = %label, blockers = ?blockers, "Stage blocked");
            self.emit(RunEventKind::StageBlocked, &label, &dir);
            return Ok(StageOutcome::Blocked { on: blockers });
        }

        // A variant finished on an earlier run counts as done even when
        // nobody selects it now.
        let artifact = stage.output().map(|output| dir.join(output));
        if artifact.as_deref().is_some_and(|a| self.memo.contains(a)) {
            debug!(stage = %label, "Output exists, skipping");
            graph.set_status(id, StageStatus::Skipped)?;
            self.emit(RunEventKind::StageMemoized, &label, &dir);
            return Ok(StageOutcome::Memoized);
        }

        if stage.escalation().is_some() && !self.is_selected(&label, &dir) {
            self.emit(RunEventKind::StageHeld, &label, &dir);
            return Ok(StageOutcome::Held);
        }

        let plan = match self.planner.plan(stage) {
            Ok(plan) => plan,
            Err(err) => return self.fail(graph, stage, &dir, err.to_string()),
        };

        let args = stage.params().get_args(&*graph)?;
        let script = self.renderer.render(stage, &dir, &plan, &args);
        std::fs::create_dir_all(&dir)?;
        let script_path = dir.join(SCRIPT_NAME);
        std::fs::write(&script_path, script)?;
        self.emit(RunEventKind::StageRendered, &label, &dir);

        if self.config.dry_run {
            rendered.insert(id);
            return Ok(StageOutcome::Rendered);
        }

        let holds: Vec<String> = stage
            .prereqs()
            .iter()
            .filter_map(|p| graph.stage(*p).and_then(Stage::job_id))
            .map(ToString::to_string)
            .collect();
        let request = SubmitRequest {
            name: job_name(stage),
            dir: dir.clone(),
            script: script_path,
            plan,
            holds,
        };

        match self.submitter.submit(&request) {
            Ok(SubmitOutcome::Queued(job_id)) => {
                info!(stage = %label, job_id = %job_id, "Submitted stage");
                graph.set_status(id, StageStatus::Running)?;
                graph.set_job_id(id, Some(job_id.clone()))?;
                self.events.emit(
                    RunEventKind::StageSubmitted,
                    serde_json::json!({ "stage": label, "dir": dir, "job_id": job_id }),
                );
                Ok(StageOutcome::Submitted { job_id })
            }
            Ok(SubmitOutcome::Completed { success: true }) => {
                if let Some(artifact) = &artifact {
                    self.memo.record(artifact);
                }
                graph.set_status(id, StageStatus::Succeeded)?;
                self.emit(RunEventKind::StageSubmitted, &label, &dir);
                Ok(StageOutcome::Completed)
            }
            Ok(SubmitOutcome::Completed { success: false }) => {
                self.fail(graph, stage, &dir, "script exited unsuccessfully".to_string())
            }
            Err(err) => self.fail(graph, stage, &dir, err.to_string()),
        }
    }

    fn fail(
        &self,
        graph: &mut StageGraph,
        stage: &Stage,
        dir: &Path,
        reason: String,
    ) -> Result<StageOutcome, SweepflowError> {
        warn!(stage = %stage.label(), reason = %reason, "Stage failed");
        graph.set_status(stage.id(), StageStatus::Failed)?;
        self.events.emit(
            RunEventKind::StageFailed,
            serde_json::json!({ "stage": stage.label(), "dir": dir, "reason": reason }),
        );
        Ok(StageOutcome::Failed { reason })
    }

    fn is_selected(&self, label: &str, dir: &Path) -> bool {
        self.config.escalate.contains(label)
            || self
                .config
                .escalate
                .iter()
                .any(|selected| Path::new(selected) == dir)
    }

    fn emit(&self, kind: RunEventKind, label: &str, dir: &Path) {
        self.events.emit(kind, serde_json::json!({ "stage": label, "dir": dir }));
    }

    fn write_manifest(
        &self,
        graph: &StageGraph,
        report: &RunReport,
        started_at: &Timestamp,
    ) -> Result<(), SweepflowError> {
        let manifest = Manifest {
            run_id: &report.run_id,
            started_at: format_timestamp(started_at),
            created_at: iso_timestamp(),
            experiment_dir: &report.experiment_dir,
            dry_run: report.dry_run,
            stages: graph.manifest(),
        };
        let path = report.experiment_dir.join(MANIFEST_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
        debug!(path = %path.display(), "Wrote manifest");
        Ok(())
    }
}
