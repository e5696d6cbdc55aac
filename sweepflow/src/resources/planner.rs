//! Per-stage resource planning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{DependencyParseHeuristic, MemoryHeuristic};
use crate::config::ResourceConfig;
use crate::errors::ResourceEstimationError;
use crate::graph::Stage;
use crate::params::ParamSet;

/// Resources requested for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePlan {
    /// Working memory in megabytes.
    pub work_mem_megs: u64,
    /// Slots on one machine.
    pub threads: u32,
    /// Wall-clock limit in minutes.
    pub minutes: u64,
    /// Queue to submit to.
    pub queue: Option<String>,
}

impl ResourcePlan {
    /// Wall-clock limit as `HH:MM:SS`.
    #[must_use]
    pub fn runtime(&self) -> String {
        format!("{:02}:{:02}:00", self.minutes / 60, self.minutes % 60)
    }
}

/// Derives a [`ResourcePlan`] from a stage's parameters.
#[derive(Clone)]
pub struct ResourcePlanner {
    config: ResourceConfig,
    queue: Option<String>,
    heuristic: Arc<dyn MemoryHeuristic>,
}

impl fmt::Debug for ResourcePlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePlanner")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("heuristic", &self.heuristic.name())
            .finish()
    }
}

impl Default for ResourcePlanner {
    fn default() -> Self {
        Self::new(ResourceConfig::default())
    }
}

impl ResourcePlanner {
    /// Creates a planner using the dependency parsing heuristic.
    #[must_use]
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            config,
            queue: None,
            heuristic: Arc::new(DependencyParseHeuristic::default()),
        }
    }

    /// Sets the queue.
    #[must_use]
    pub fn with_queue(mut self, queue: Option<String>) -> Self {
        self.queue = queue;
        self
    }

    /// Sets the memory heuristic.
    #[must_use]
    pub fn with_heuristic(mut self, heuristic: Arc<dyn MemoryHeuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }

    /// Returns the resource configuration.
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Working memory for a parameter set: the explicit value, else the
    /// heuristic estimate.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no explicit value and the heuristic
    /// lacks its signals.
    pub fn work_mem_megs(&self, params: &ParamSet) -> Result<u64, ResourceEstimationError> {
        match positive_amount(params, "work_mem_megs") {
            Some(megs) => Ok(megs),
            None => self.heuristic.estimate_megs(params),
        }
    }

    /// Plans the resources of one stage.
    ///
    /// # Errors
    ///
    /// Returns an error if memory cannot be estimated.
    pub fn plan(&self, stage: &Stage) -> Result<ResourcePlan, ResourceEstimationError> {
        let params = stage.params();
        let work_mem_megs = self
            .work_mem_megs(params)
            .map_err(|e| e.for_stage(stage.label()))?;

        // One extra slot for the JVM's own threads.
        let threads = positive_amount(params, "threads")
            .and_then(|t| u32::try_from(t).ok())
            .map_or(self.config.default_threads, |t| t.saturating_add(1));

        let minutes = params
            .get_f64("timeoutSeconds")
            .filter(|s| *s > 0.0)
            .map_or(self.config.default_minutes, |seconds| {
                (seconds / 60.0 * 2.0).ceil() as u64 + 10
            });

        Ok(ResourcePlan {
            work_mem_megs,
            threads,
            minutes,
            queue: self.queue.clone(),
        })
    }
}

/// Reads a positive amount, integer or float, rounding fractions up.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn positive_amount(params: &ParamSet, key: &str) -> Option<u64> {
    params
        .get_f64(key)
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v.ceil() as u64)
}
