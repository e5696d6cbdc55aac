//! Dependency parsing sweeps.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::context::{display, ExperimentContext};
use super::defs::{
    adagrad, adagrad_comid, apply_visibility, asgd, basic_car_feats, c07_data, cll, cx_data, defaults,
    erma_dp, erma_dp_nomse, erma_mse, feat_mcdonald, feat_mcdonald_basic, first_order, fobos, is_cll,
    is_higher_order, pruned, pruned_parsers, second_order, sgd, short_sentences, unpruned_parsers,
    CONLL07_LANGUAGES, CONLLX_LANGUAGES, MODEL_FILE,
};
use crate::core::StageKind;
use crate::errors::{ConfigError, GraphError, SweepflowError};
use crate::graph::{Stage, StageGraph, StageId, StagePath, StageSpec};
use crate::params::ParamSet;
use crate::resources::{get_oome_stages, OomeLadder};

/// Entry point of the annotation pipeline runner.
pub const ANNO_PIPELINE_MAIN: &str = "edu.jhu.nlp.AnnoPipelineRunner";
/// Entry point of the memory exhaustion probe.
pub const GOBBLE_MEMORY_MAIN: &str = "edu.jhu.util.GobbleMemory";

const PIPE_FILE: &str = "pipe.binary.gz";

/// A graph under construction for one experiment definition.
pub(crate) struct Sweep<'a> {
    ctx: &'a ExperimentContext,
    graph: StageGraph,
}

impl<'a> Sweep<'a> {
    pub(crate) fn new(ctx: &'a ExperimentContext) -> Self {
        Self {
            ctx,
            graph: StageGraph::new(),
        }
    }

    fn add(&mut self, mut spec: StageSpec) -> Result<StageId, GraphError> {
        apply_visibility(&mut spec.params);
        self.graph.add_stage(spec)
    }

    /// Adds an experiment directly under the root.
    fn experiment(&mut self, params: ParamSet) -> Result<StageId, GraphError> {
        let id = self.add(StageSpec::experiment(params))?;
        self.graph.add_prereq(id, StageId::ROOT)?;
        Ok(id)
    }

    /// Adds a stage that waits on `prereqs`.
    fn after(&mut self, prereqs: &[StageId], spec: StageSpec) -> Result<StageId, GraphError> {
        let id = self.add(spec)?;
        self.graph.add_prereqs(id, prereqs.iter().copied())?;
        Ok(id)
    }

    /// Fixes the planner's memory estimate into `params`.
    fn sized(&self, mut params: ParamSet) -> Result<ParamSet, SweepflowError> {
        let work_mem_megs = self
            .ctx
            .planner
            .work_mem_megs(&params)
            .map_err(|e| e.for_stage(params.get_name()))?;
        params.set("work_mem_megs", work_mem_megs, false, false);
        Ok(params)
    }

    fn escalate(&mut self, id: StageId) -> Result<OomeLadder, SweepflowError> {
        get_oome_stages(&mut self.graph, id, &self.ctx.planner)
    }

    /// Finishes a sweep whose experiments all hang off the root. Fast runs
    /// keep the first `num_for_fast`.
    fn flat(mut self, num_for_fast: usize) -> Result<StageGraph, SweepflowError> {
        if self.ctx.fast {
            let removed = self.graph.truncate_dependents(StageId::ROOT, num_for_fast)?;
            debug!(kept = num_for_fast, removed = removed.len(), "Truncated sweep");
        }
        let finished: Vec<StageId> = self
            .graph
            .get(StageId::ROOT)?
            .dependents()
            .iter()
            .copied()
            .filter(|id| self.graph.stage(*id).is_some_and(|s| s.escalation().is_none()))
            .collect();
        self.scrape(finished)?;
        Ok(self.graph)
    }

    /// Finishes a sweep built as a tree. Fast runs keep `keep` branches
    /// below the first experiment.
    fn tree(mut self, keep: usize) -> Result<StageGraph, SweepflowError> {
        if self.ctx.fast {
            if let Some(first) = self.graph.get(StageId::ROOT)?.dependents().first().copied() {
                let removed = self.graph.truncate_dependents(first, keep)?;
                debug!(kept = keep, removed = removed.len(), "Truncated sweep");
            }
        }
        let finished: Vec<StageId> = self
            .graph
            .dfs_stages(StageId::ROOT)
            .filter(|s| s.kind() != StageKind::Root && s.escalation().is_none())
            .map(Stage::id)
            .collect();
        self.scrape(finished)?;
        Ok(self.graph)
    }

    /// Scrapes finished stages. Escalation variants are left out so a
    /// held variant never blocks the scrape.
    fn scrape(&mut self, prereqs: Vec<StageId>) -> Result<StageId, GraphError> {
        let mut params = ParamSet::new();
        params.put("csv_file", "results.csv").put("tsv_file", "results.data");
        self.graph
            .add_scrape_stage(StageSpec::scrape(params, &self.ctx.scrape_command), prereqs)
    }
}

fn bp_iterations(n: i64) -> ParamSet {
    let mut p = ParamSet::new();
    p.put("bpMaxIterations", n);
    p
}

fn prune_model(stage: StageId) -> StagePath {
    StagePath::new(stage, MODEL_FILE)
}

/// Pretrained pruning model named by a data group.
fn pretrained_prune_model(data: &ParamSet) -> Result<String, ConfigError> {
    data.get_str("prune_model_path")
        .map(ToString::to_string)
        .ok_or_else(|| ConfigError::invalid("prune_model_path", "data group names no pruning model"))
}

/// Second-order parsers with grandparent or sibling factors, approximate
/// inference, run close to the memory limit.
fn needs_ladder(parser: &ParamSet) -> bool {
    let tagger_parser = parser
        .get_str("tagger_parser")
        .map_or("", |t| t.trim_end_matches("-pr"));
    matches!(tagger_parser, "2nd-gra-asib-hb" | "2nd-gra" | "2nd-asib")
        && parser.get_str("inference") != Some("DP")
}

/// Optimizer speed with different thread counts and batch sizes.
pub(crate) fn dp_opt(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx) + cll() + short_sentences(5000);
    base.put("regularizer", "NONE").put("l2variance", 16_000);
    base.remove("modelOut");
    let data = cx_data(ctx, "en")?;

    for threads in [1, 2, 7, 15] {
        for scale in [1, 2, 4, 8] {
            let mut exp = &base + &data + first_order() + adagrad_comid();
            exp.put("sgdEarlyStopping", true)
                .put("threads", threads)
                .put("sgdBatchSize", threads * scale);
            sweep.experiment(exp)?;
        }
    }
    sweep.flat(4)
}

/// Whether a log-add table costs accuracy, per semiring.
pub(crate) fn dp_logadd(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx) + cll() + short_sentences(5000);
    base.put("l2variance", 16_000)
        .put("sgdBatchSize", 1)
        .put("threads", 1);
    base.remove("modelOut");
    let data = cx_data(ctx, "en")?;

    for algebra in ["LOG", "LOG_SIGN", "REAL"] {
        for use_table in [true, false] {
            let mut exp = &base + &data + first_order();
            exp.put("useLogAddTable", use_table).put("algebra", algebra);
            sweep.experiment(exp)?;
        }
    }
    sweep.flat(4)
}

/// Learning with and without parameter averaging.
pub(crate) fn dp_opt_avg(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx) + cll() + short_sentences(5000);
    base.remove("modelOut");
    let data = cx_data(ctx, "en")?;

    for optimizer in [asgd(), fobos(), sgd(), adagrad()] {
        for averaging in [true, false] {
            for regularizer in ["NONE", "L2"] {
                let mut exp = &base + &data + first_order() + &optimizer;
                exp.put("sgdAveraging", averaging).put("regularizer", regularizer);
                sweep.experiment(exp)?;
            }
        }
    }
    sweep.flat(4)
}

/// A second-order model initialized from zero or from the pruning model.
pub(crate) fn dp_init_model(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx) + erma_dp() + short_sentences(5000);
    base.put("bpMaxIterations", 10).put("regularizer", "NONE");
    let data = cx_data(ctx, "en")?;

    let prune = sweep.experiment(&base + &data + first_order())?;
    base.remove("modelOut");

    let mut from_prune = ParamSet::new();
    from_prune
        .put("pruneModel", prune_model(prune))
        .put("modelIn", prune_model(prune))
        .put("group", "init1st");
    let mut from_zero = ParamSet::new();
    from_zero.put("pruneModel", prune_model(prune)).put("group", "init0");

    for init in [from_prune, from_zero] {
        let exp = sweep.experiment(&base + &data + second_order() + init)?;
        sweep.graph.add_prereq(exp, prune)?;
    }
    sweep.flat(4)
}

/// Conditional log-likelihood training of pruned first and second-order
/// models.
pub(crate) fn dp_cll(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx) + cll();
    base.put("trainMaxSentenceLength", 20)
        .put("sgdNumPasses", 10)
        .put("bpMaxIterations", 10);
    base.set("work_mem_megs", 5000, false, false);

    let mut prunes = Vec::new();
    for language in ["en"] {
        let mut data = cx_data(ctx, language)?;
        data.put("propTrainAsDev", 0);
        let prune = sweep.experiment(&base + &data + first_order())?;
        prunes.push((data, prune));
    }

    base.remove("modelOut");
    for (data, prune) in prunes {
        for parser in [pruned(&first_order()), pruned(&second_order())] {
            let mut data = data.clone();
            data.put("pruneModel", prune_model(prune));
            let exp = sweep.experiment(&base + &data + parser)?;
            sweep.graph.add_prereq(exp, prune)?;
        }
    }
    sweep.flat(4)
}

/// CLL against ERMA training over every pruned parser and a range of
/// belief propagation iterations. ERMA models are fine-tuned with the
/// decoding loss afterwards.
pub(crate) fn dp_aware(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);

    let mut prunes = Vec::new();
    for language in ["en"] {
        let mut data = cx_data(ctx, language)?;
        data.put("propTrainAsDev", 0);
        let prune = sweep.experiment(defaults(ctx) + &data + first_order() + basic_car_feats())?;
        prunes.push((language, prune));
    }

    for (language, prune) in prunes {
        for bp in 1..=4 {
            for trainer in [erma_mse(), cll()] {
                let cll_trained = is_cll(&trainer);
                for parser in pruned_parsers() {
                    if parser.get_str("inference") == Some("DP") && (!cll_trained || bp != 1) {
                        continue;
                    }
                    if !is_higher_order(&parser) && bp != 1 {
                        continue;
                    }
                    let mut data = cx_data(ctx, language)?;
                    data.put("pruneModel", prune_model(prune)).put("propTrainAsDev", 0.0);

                    let mut exp = defaults(ctx) + &data + &parser + &trainer + bp_iterations(bp);
                    if cll_trained {
                        exp.remove("modelOut");
                    }
                    let exp = sweep.after(&[prune], StageSpec::experiment(exp))?;

                    if cll_trained {
                        // Nothing reads these models, so a variant can stand in for its base.
                        if is_higher_order(&parser) {
                            sweep.escalate(exp)?;
                        }
                        continue;
                    }
                    let mut tuned = defaults(ctx) + &data + &parser + erma_dp_nomse() + bp_iterations(bp);
                    tuned.put("modelIn", StagePath::new(exp, MODEL_FILE));
                    tuned.remove("modelOut");
                    sweep.after(&[prune, exp], StageSpec::experiment(tuned))?;
                }
            }
        }
    }
    sweep.tree(2)
}

/// Hyperparameter tuning on two CoNLL-X languages with a fixed seed.
pub(crate) fn dp_conllx_tune(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx);
    base.put("seed", 123_456_789);

    for language in ["es", "bg"] {
        let data = cx_data(ctx, language)?;
        for parser in [second_order(), first_order()] {
            for eta in [0.05, 0.01, 0.1, 0.001, 1.0] {
                for l2variance in [10_000, 1000, 100_000, 100] {
                    for passes in [3, 5] {
                        let mut hyper = ParamSet::new();
                        hyper
                            .put("sgdNumPasses", passes)
                            .put("adaGradEta", eta)
                            .put("l2variance", l2variance);
                        sweep.experiment(&base + &data + &parser + hyper)?;
                    }
                }
            }
        }
    }
    sweep.flat(4)
}

/// ERMA training of first-order pruning models and pruned second-order
/// models on every CoNLL-X language.
pub(crate) fn dp_erma(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let base = defaults(ctx) + erma_mse();

    let mut prunes = Vec::new();
    for language in CONLLX_LANGUAGES {
        let mut data = cx_data(ctx, language.short)?;
        data.put("propTrainAsDev", 0).put("trainUseCoNLLXPhead", false);
        let basic = sweep.sized(&base + &data + first_order() + feat_mcdonald_basic())?;
        sweep.experiment(basic)?;
        let full = sweep.sized(&base + &data + first_order() + feat_mcdonald())?;
        let prune = sweep.experiment(full)?;
        prunes.push((data, prune));
    }

    let parser = pruned(&second_order());
    for (mut data, prune) in prunes {
        data.put("pruneModel", prune_model(prune));
        let exp = sweep.sized(&base + &data + &parser)?;
        let exp = sweep.experiment(exp)?;
        sweep.graph.add_prereq(exp, prune)?;
    }
    sweep.flat(4)
}

/// Pruning models for every CoNLL-X and CoNLL-2007 language, written to
/// the shared models directory. A model already there is not retrained.
pub(crate) fn dp_pruning(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx);
    base.put("featureHashMod", 10_000_000);

    let mut datasets = Vec::new();
    for language in CONLLX_LANGUAGES {
        datasets.push(cx_data(ctx, language.short)?);
    }
    for language in CONLL07_LANGUAGES {
        datasets.push(c07_data(ctx, language.short)?);
    }

    for mut data in datasets {
        data.put("propTrainAsDev", 0);
        let model = pretrained_prune_model(&data)?;
        let mut exp = sweep.sized(&base + &data + first_order() + cll() + basic_car_feats())?;
        exp.put("modelOut", model.as_str());
        let stage = sweep.add(StageSpec::experiment(exp).with_output(model))?;
        sweep.graph.add_prereq(stage, StageId::ROOT)?;
    }
    sweep.flat(25)
}

/// CoNLL-2007 runs of every unpruned parser on English.
pub(crate) fn dp_conll07(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let base = defaults(ctx) + cll();

    for language in CONLL07_LANGUAGES.iter().filter(|l| l.short == "en") {
        for parser in unpruned_parsers() {
            let mut data = c07_data(ctx, language.short)?;
            data.put("propTrainAsDev", 0);
            let exp = sweep.sized(&base + &data + &parser)?;
            let exp = sweep.experiment(exp)?;
            if needs_ladder(&parser) {
                sweep.escalate(exp)?;
            }
        }
    }
    sweep.flat(4)
}

/// CoNLL-X runs of every pruned parser on the English treebanks, pruned
/// by the pretrained first-order models.
pub(crate) fn dp_conllx(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let base = defaults(ctx) + cll();

    for language in CONLLX_LANGUAGES.iter().filter(|l| l.short.starts_with("en")) {
        for parser in pruned_parsers() {
            let mut data = cx_data(ctx, language.short)?;
            let model = pretrained_prune_model(&data)?;
            data.put("pruneModel", model).put("propTrainAsDev", 0);
            let exp = sweep.sized(&base + &data + &parser)?;
            let exp = sweep.experiment(exp)?;
            if needs_ladder(&parser) {
                sweep.escalate(exp)?;
            }
        }
    }
    sweep.flat(4)
}

/// An English model annotating Annotated Gigaword and CoNLL-2009.
pub(crate) fn dp_agiga2(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut base = defaults(ctx) + cll() + first_order();
    base.put("pruneByDist", true);
    let work_mem_megs = ctx.planner.work_mem_megs(&base)?;
    base.set("work_mem_megs", work_mem_megs, false, false);

    let mut train = base + cx_data(ctx, "en")?;
    if ctx.fast {
        train
            .put("pruneByDist", false)
            .put("trainMaxNumSentences", 3)
            .put("devMaxNumSentences", 3)
            .put("trainMaxSentenceLength", 7)
            .put("devMaxSentenceLength", 7)
            .put("featureHashMod", 1000)
            .put("sgdNumPasses", 2);
    }
    train.put("pipeOut", PIPE_FILE);
    for key in ["test", "testType", "testPredOut"] {
        train.remove(key);
    }
    let train = sweep.experiment(train)?;

    let mut annotate = ParamSet::new().with_initial_keys(["group"]);
    annotate
        .put("pipeIn", StagePath::new(train, PIPE_FILE))
        .put("predAts", "DEP_TREE");
    annotate.set("work_mem_megs", work_mem_megs, false, false);

    let mut inputs: Vec<(PathBuf, &str)> = communications(&ctx.concrete_dir())?
        .into_iter()
        .map(|path| (path, "CONCRETE"))
        .collect();
    inputs.extend(
        ["train", "development", "evaluation"]
            .into_iter()
            .map(|split| (ctx.conll09_english(split), "CONLL_2009")),
    );

    for (input, kind) in inputs {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut exp = annotate.clone();
        exp.put("test", display(&input))
            .put("testType", kind)
            .put("group", name.as_str())
            .put("testPredOut", name.as_str());
        if ctx.fast && kind == "CONLL_2009" {
            exp.put("testMaxNumSentences", 3).put("testMaxSentenceLength", 7);
        }
        sweep.after(
            &[train],
            StageSpec::experiment(exp).with_entry_point(ANNO_PIPELINE_MAIN),
        )?;
    }
    Ok(sweep.graph)
}

fn communications(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ConfigError::invalid("concrete_dir", format!("{}: {e}", dir.display())))?;
    let mut files: Vec<PathBuf> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    files.sort();
    if files.is_empty() {
        return Err(ConfigError::invalid(
            "concrete_dir",
            format!("no communications under {}", dir.display()),
        ));
    }
    Ok(files)
}

/// Exhausts memory on purpose to exercise the escalation ladder.
pub(crate) fn gobble_memory(ctx: &ExperimentContext) -> Result<StageGraph, SweepflowError> {
    let mut sweep = Sweep::new(ctx);
    let mut params = ParamSet::new();
    params.put("megsToGobble", 300);
    params.set("work_mem_megs", 100, true, false);

    let stage = sweep.add(StageSpec::experiment(params).with_entry_point(GOBBLE_MEMORY_MAIN))?;
    sweep.graph.add_prereq(stage, StageId::ROOT)?;
    sweep.escalate(stage)?;
    sweep.flat(4)
}
