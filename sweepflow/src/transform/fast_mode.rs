//! Rewrites experiments into quick smoke tests.

use tracing::debug;

use super::{put_override, rewrite_parser_stages};
use crate::errors::GraphError;
use crate::graph::StageGraph;
use crate::params::ParamSet;

/// Caps that bound the cost of a single run.
///
/// Applying the transform twice gives the same result as applying it once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastMode {
    /// Fixed values written over whatever the stage had.
    pub overrides: Vec<(&'static str, i64)>,
    /// Upper bound on belief propagation iterations.
    pub max_bp_iterations: i64,
    /// Feature hash size used when hashing is on.
    pub feature_hash_mod: i64,
}

impl Default for FastMode {
    fn default() -> Self {
        Self {
            overrides: vec![
                ("maxLbfgsIterations", 3),
                ("sgdNumPasses", 2),
                ("trainMaxSentenceLength", 7),
                ("trainMaxNumSentences", 3),
                ("devMaxSentenceLength", 11),
                ("devMaxNumSentences", 3),
                ("testMaxSentenceLength", 7),
                ("testMaxNumSentences", 3),
                ("work_mem_megs", 2000),
                ("timeoutSeconds", 20),
            ],
            max_bp_iterations: 2,
            feature_hash_mod: 1000,
        }
    }
}

impl FastMode {
    /// Creates the default transform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shrunk copy of `params`.
    #[must_use]
    pub fn apply(&self, params: &ParamSet) -> ParamSet {
        let mut out = params.clone();
        self.apply_in_place(&mut out);
        out
    }

    /// Shrinks `params` in place. Existing keys keep their flags. Added
    /// keys stay out of the name, and runner settings out of the arguments.
    pub fn apply_in_place(&self, params: &mut ParamSet) {
        for (key, value) in &self.overrides {
            put_override(params, key, *value);
        }
        if params
            .get_i64("bpMaxIterations")
            .is_some_and(|n| n > self.max_bp_iterations)
        {
            params.put("bpMaxIterations", self.max_bp_iterations);
        }
        if params.get_i64("featureHashMod").is_some_and(|n| n > 1) {
            params.put("featureHashMod", self.feature_hash_mod);
        }
    }

    /// Shrinks every experiment stage of an unfrozen graph that runs the
    /// default entry point. Escalation variants stay above their shrunk
    /// base. Returns the number of stages rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is frozen.
    pub fn apply_to_graph(&self, graph: &mut StageGraph) -> Result<usize, GraphError> {
        let shrunk = rewrite_parser_stages(graph, |params| self.apply_in_place(params))?;
        debug!(stages = shrunk, "Applied fast mode");
        Ok(shrunk)
    }
}
