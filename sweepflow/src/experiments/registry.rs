//! The closed set of experiment definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use super::context::ExperimentContext;
use super::dp;
use crate::errors::{ConfigError, SweepflowError};
use crate::graph::StageGraph;
use crate::resources::{DependencyParseHeuristic, FixedHeuristic, MemoryHeuristic};
use crate::transform::{FastMode, SmallMachine};

/// Builds the graph of one experiment definition.
pub type BuildFn = fn(&ExperimentContext) -> Result<StageGraph, SweepflowError>;

/// A named experiment definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentKind {
    /// Optimizer speed across thread counts and batch sizes.
    DpOpt,
    /// Accuracy cost of the log-add table.
    DpLogadd,
    /// Parameter averaging per optimizer.
    DpOptAvg,
    /// Second-order model initialization.
    DpInitModel,
    /// Pruned CLL training.
    DpCll,
    /// CLL against ERMA training.
    DpAware,
    /// CoNLL-X hyperparameter tuning.
    DpConllxTune,
    /// CoNLL-X runs of pruned parsers.
    DpConllx,
    /// CoNLL-2007 runs of unpruned parsers.
    DpConll07,
    /// ERMA training with pruning.
    DpErma,
    /// Pruning models for every language.
    DpPruning,
    /// Annotated Gigaword annotation.
    DpAgiga2,
    /// Memory exhaustion probe.
    GobbleMemory,
}

/// Builder of every kind.
const BUILDERS: [(ExperimentKind, BuildFn); 13] = [
    (ExperimentKind::DpOpt, dp::dp_opt),
    (ExperimentKind::DpLogadd, dp::dp_logadd),
    (ExperimentKind::DpOptAvg, dp::dp_opt_avg),
    (ExperimentKind::DpInitModel, dp::dp_init_model),
    (ExperimentKind::DpCll, dp::dp_cll),
    (ExperimentKind::DpAware, dp::dp_aware),
    (ExperimentKind::DpConllxTune, dp::dp_conllx_tune),
    (ExperimentKind::DpConllx, dp::dp_conllx),
    (ExperimentKind::DpConll07, dp::dp_conll07),
    (ExperimentKind::DpErma, dp::dp_erma),
    (ExperimentKind::DpPruning, dp::dp_pruning),
    (ExperimentKind::DpAgiga2, dp::dp_agiga2),
    (ExperimentKind::GobbleMemory, dp::gobble_memory),
];

impl ExperimentKind {
    /// Every kind, in listing order.
    pub const ALL: [Self; 13] = [
        Self::DpOpt,
        Self::DpLogadd,
        Self::DpOptAvg,
        Self::DpInitModel,
        Self::DpCll,
        Self::DpAware,
        Self::DpConllxTune,
        Self::DpConllx,
        Self::DpConll07,
        Self::DpErma,
        Self::DpPruning,
        Self::DpAgiga2,
        Self::GobbleMemory,
    ];

    /// The name used on the command line and for the experiment directory.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DpOpt => "dp-opt",
            Self::DpLogadd => "dp-logadd",
            Self::DpOptAvg => "dp-opt-avg",
            Self::DpInitModel => "dp-init-model",
            Self::DpCll => "dp-cll",
            Self::DpAware => "dp-aware",
            Self::DpConllxTune => "dp-conllx-tune",
            Self::DpConllx => "dp-conllx",
            Self::DpConll07 => "dp-conll07",
            Self::DpErma => "dp-erma",
            Self::DpPruning => "dp-pruning",
            Self::DpAgiga2 => "dp-agiga2",
            Self::GobbleMemory => "gobble-memory",
        }
    }

    /// Every known name.
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }

    /// One line describing what the definition studies.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::DpOpt => "optimizer speed across thread counts and batch sizes",
            Self::DpLogadd => "whether a log-add table costs accuracy",
            Self::DpOptAvg => "learning with and without parameter averaging",
            Self::DpInitModel => "second-order training from zero or from the pruning model",
            Self::DpCll => "CLL training of pruned first and second-order parsers",
            Self::DpAware => "CLL against ERMA training over pruned parsers",
            Self::DpConllxTune => "CoNLL-X hyperparameter tuning with a fixed seed",
            Self::DpConllx => "pruned parsers on the English CoNLL-X treebanks",
            Self::DpConll07 => "unpruned parsers on English CoNLL-2007",
            Self::DpErma => "ERMA training of pruned second-order parsers per language",
            Self::DpPruning => "first-order pruning models for every language",
            Self::DpAgiga2 => "English model annotating Annotated Gigaword 2.0",
            Self::GobbleMemory => "exhausts memory to exercise escalation",
        }
    }

    /// Memory estimate for stages that do not fix their own.
    #[must_use]
    pub fn heuristic(self) -> Arc<dyn MemoryHeuristic> {
        match self {
            Self::GobbleMemory => Arc::new(FixedHeuristic(100)),
            _ => Arc::new(DependencyParseHeuristic::default()),
        }
    }

    fn builder(self) -> Result<BuildFn, ConfigError> {
        BUILDERS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, build)| *build)
            .ok_or_else(|| ConfigError::unknown_experiment(self.as_str(), &Self::names()))
    }

    /// Builds a fresh graph, shrunk to a smoke test in fast mode and
    /// capped on a small machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition needs data that is missing or
    /// an escalation ladder cannot be sized.
    pub fn build(self, ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
        let build = self.builder()?;
        let mut graph = build(ctx)?;
        if ctx.fast {
            let shrunk = FastMode::new().apply_to_graph(&mut graph)?;
            debug!(experiment = %self, stages = shrunk, "Shrunk stages for a fast run");
        }
        if ctx.small_machine {
            let capped = SmallMachine::new().apply_to_graph(&mut graph)?;
            debug!(experiment = %self, stages = capped, "Capped stages for a small machine");
        }
        info!(experiment = %self, stages = graph.len() - 1, "Built experiment graph");
        Ok(graph)
    }
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::unknown_experiment(s, &Self::names()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use crate::core::StageKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_round_trip() {
        for kind in ExperimentKind::ALL {
            assert_eq!(kind.as_str().parse::<ExperimentKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
        assert_eq!(ExperimentKind::names().len(), 13);
    }

    #[test]
    fn test_unknown_name_lists_known() {
        let err = "dp-nope".parse::<ExperimentKind>().unwrap_err();
        match &err {
            ConfigError::UnknownExperiment { name, known } => {
                assert_eq!(name, "dp-nope");
                assert!(known.contains(&"dp-aware".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("gobble-memory"));
    }

    #[test]
    fn test_every_kind_has_one_builder() {
        for kind in ExperimentKind::ALL {
            assert_eq!(BUILDERS.iter().filter(|(k, _)| *k == kind).count(), 1);
        }
    }

    #[test]
    fn test_fast_build_shrinks_every_experiment() {
        let config = RunnerConfig::default().with_fast(true);
        let ctx = ExperimentContext::from_config(&config);
        let graph = ExperimentKind::DpLogadd.build(&ctx).unwrap();
        let exps: Vec<_> = graph.iter().filter(|s| s.kind() == StageKind::Experiment).collect();
        assert_eq!(exps.len(), 4);
        for stage in exps {
            assert_eq!(stage.params().get_i64("work_mem_megs"), Some(2000));
            assert_eq!(stage.params().get_i64("trainMaxNumSentences"), Some(3));
            assert_eq!(stage.params().get_i64("featureHashMod"), Some(1000));
            assert_eq!(stage.params().flags("work_mem_megs"), Some((false, false)));
            assert_eq!(stage.params().flags("trainMaxNumSentences"), Some((false, true)));
        }
    }

    #[test]
    fn test_small_machine_build_caps_parsers() {
        let config = RunnerConfig::default().with_small_machine(true);
        let ctx = ExperimentContext::from_config(&config);
        let graph = ExperimentKind::DpOpt.build(&ctx).unwrap();
        for stage in graph.iter().filter(|s| s.kind() == StageKind::Experiment) {
            assert_eq!(stage.params().get_i64("work_mem_megs"), Some(1100));
            assert_eq!(stage.params().get_i64("threads"), Some(1));
        }

        let dry = ExperimentContext::from_config(&config.with_dry_run(true));
        let graph = ExperimentKind::DpOpt.build(&dry).unwrap();
        assert!(graph
            .iter()
            .filter(|s| s.kind() == StageKind::Experiment)
            .any(|s| s.params().get_i64("threads") == Some(15)));
    }

    #[test]
    fn test_built_graph_freezes() {
        let ctx = ExperimentContext::from_config(&RunnerConfig::default());
        let mut graph = ExperimentKind::DpCll.build(&ctx).unwrap();
        graph.freeze().unwrap();
        assert_eq!(ExperimentKind::GobbleMemory.heuristic().name(), "fixed");
    }
}
