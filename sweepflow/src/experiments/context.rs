//! Inputs shared by every experiment builder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RunnerConfig;
use crate::resources::{MemoryHeuristic, ResourcePlanner};
use crate::utils::random_seed;

/// Everything a builder may depend on besides its own parameter groups.
#[derive(Debug, Clone)]
pub struct ExperimentContext {
    /// Build the shrunk smoke-test variant.
    pub fast: bool,
    /// Cap parser stages for a small machine.
    pub small_machine: bool,
    /// Project checkout.
    pub root_dir: PathBuf,
    /// Corpora and tag maps.
    pub data_dir: PathBuf,
    /// Pretrained pruning models.
    pub models_dir: PathBuf,
    /// Seed handed to every experiment that does not fix its own.
    pub seed: i64,
    /// Command run by scrape stages.
    pub scrape_command: String,
    /// Planner used to size escalation ladders.
    pub planner: ResourcePlanner,
}

impl ExperimentContext {
    /// Derives a context from the run configuration with a fresh seed.
    #[must_use]
    pub fn from_config(config: &RunnerConfig) -> Self {
        let root_dir = config.root_dir.clone();
        let models = if config.fast {
            "fast-dp-pruning-workaround"
        } else {
            "dp-pruning-workaround"
        };
        Self {
            fast: config.fast,
            small_machine: config.caps_small_machine(),
            data_dir: root_dir.join("data"),
            models_dir: root_dir.join("exp").join("models").join(models),
            root_dir,
            seed: random_seed(),
            scrape_command: config.scrape_command.clone(),
            planner: ResourcePlanner::new(config.resources.clone()).with_queue(config.queue.clone()),
        }
    }

    /// Fixes the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    /// Points at another data directory.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Replaces the memory heuristic used for escalation ladders.
    #[must_use]
    pub fn with_heuristic(mut self, heuristic: Arc<dyn MemoryHeuristic>) -> Self {
        self.planner = self.planner.with_heuristic(heuristic);
        self
    }

    /// Path of the pruning model trained for a CoNLL-X language.
    #[must_use]
    pub fn prune_model_path(&self, language: &str) -> PathBuf {
        self.models_dir
            .join(format!("1st_cx_{language}"))
            .join(super::defs::MODEL_FILE)
    }

    /// Path of the pruning model trained for a CoNLL-2007 language.
    #[must_use]
    pub fn c07_prune_model_path(&self, language: &str) -> PathBuf {
        self.models_dir
            .join(format!("1st_c07_{language}"))
            .join(super::defs::MODEL_FILE)
    }

    /// Directory holding the CoNLL-2007 files of one language.
    #[must_use]
    pub fn conll07_dir(&self, language: &str) -> PathBuf {
        self.data_dir.join("conll2007").join(language)
    }

    /// Directory holding the CoNLL-X files of one language.
    #[must_use]
    pub fn conllx_dir(&self, language: &str) -> PathBuf {
        self.data_dir.join("conllx").join(language)
    }

    /// Tag reduction map of one language.
    #[must_use]
    pub fn tag_map(&self, name: &str) -> PathBuf {
        self.data_dir.join("tag_maps").join(format!("{name}.map"))
    }

    /// Directory of Annotated Gigaword communications.
    #[must_use]
    pub fn concrete_dir(&self) -> PathBuf {
        self.data_dir.join("agiga2").join("concrete-3.8.0")
    }

    /// English CoNLL-2009 split with gold part-of-speech tags.
    #[must_use]
    pub fn conll09_english(&self, split: &str) -> PathBuf {
        self.data_dir
            .join("conll2009")
            .join("en")
            .join(format!("CoNLL2009-ST-English-{split}.txt"))
    }
}

pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fast_context_uses_fast_models() {
        let config = RunnerConfig::default().with_root_dir("/proj").with_fast(true);
        let ctx = ExperimentContext::from_config(&config).with_seed(7);
        assert!(ctx.fast);
        assert_eq!(ctx.seed, 7);
        assert_eq!(
            ctx.prune_model_path("bg"),
            PathBuf::from("/proj/exp/models/fast-dp-pruning-workaround/1st_cx_bg/model.binary.gz")
        );
        assert_eq!(ctx.conllx_dir("bg"), PathBuf::from("/proj/data/conllx/bg"));
        assert_eq!(ctx.conll07_dir("eu"), PathBuf::from("/proj/data/conll2007/eu"));
        assert_eq!(
            ctx.c07_prune_model_path("eu"),
            PathBuf::from("/proj/exp/models/fast-dp-pruning-workaround/1st_c07_eu/model.binary.gz")
        );
        assert!(!ctx.small_machine);
    }

    #[test]
    fn test_small_machine_follows_dry_run() {
        let config = RunnerConfig::default().with_small_machine(true);
        assert!(ExperimentContext::from_config(&config).small_machine);
        assert!(!ExperimentContext::from_config(&config.with_dry_run(true)).small_machine);
    }
}
