//! Caps parser stages to what a small workstation can run.

use tracing::debug;

use super::{put_override, rewrite_parser_stages};
use crate::errors::GraphError;
use crate::graph::StageGraph;
use crate::params::ParamSet;

/// Memory and thread caps for hosts with few cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmallMachine {
    /// Working memory every parser stage gets.
    pub work_mem_megs: i64,
    /// Threads every parser stage gets.
    pub threads: i64,
}

impl Default for SmallMachine {
    fn default() -> Self {
        Self {
            work_mem_megs: 1100,
            threads: 1,
        }
    }
}

impl SmallMachine {
    /// Creates the default caps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps `params` in place.
    pub fn apply_in_place(&self, params: &mut ParamSet) {
        put_override(params, "work_mem_megs", self.work_mem_megs);
        put_override(params, "threads", self.threads);
    }

    /// Caps every experiment stage of an unfrozen graph that runs the
    /// default entry point. Escalation variants keep doubling from the
    /// capped memory. Returns the number of stages rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is frozen.
    pub fn apply_to_graph(&self, graph: &mut StageGraph) -> Result<usize, GraphError> {
        let capped = rewrite_parser_stages(graph, |params| self.apply_in_place(params))?;
        debug!(stages = capped, work_mem_megs = self.work_mem_megs, "Capped stages for a small machine");
        Ok(capped)
    }
}
