//! Parameter groups of the dependency parsing sweeps.
//!
//! Every function returns a fresh [`ParamSet`]. Builders compose them per
//! branch and never share a mutable accumulator.

use super::context::{display, ExperimentContext};
use crate::errors::ConfigError;
use crate::params::ParamSet;

/// Model file written by training runs and read by later stages.
pub const MODEL_FILE: &str = "model.binary.gz";

/// Keys that lead every stage name, in this order.
pub const INITIAL_KEYS: [&str; 4] = ["language", "tagger_parser", "trainer", "feature_set"];

/// Keys never part of a stage name.
pub const HIDDEN_NAME_KEYS: [&str; 28] = [
    "pruneByModel",
    "pruneModel",
    "prune_model_path",
    "siblingFactors",
    "headBigramFactors",
    "grandparentFactors",
    "dpSkipPunctuation",
    "reduceTags",
    "l2variance",
    "basicOnly",
    "useMstFeats",
    "useCarerrasFeats",
    "useCoarseTags",
    "train",
    "dev",
    "test",
    "seed",
    "printModel",
    "modelOut",
    "trainPredOut",
    "testPredOut",
    "trainGoldOut",
    "testGoldOut",
    "pipeOut",
    "timeoutSeconds",
    "work_mem_megs",
    "expname",
    "datasource",
];

/// Keys never passed to the executable.
pub const HIDDEN_ARG_KEYS: [&str; 8] = [
    "group",
    "datasource",
    "prune_model_path",
    "tagger_parser",
    "feature_set",
    "timeoutSeconds",
    "work_mem_megs",
    "expname",
];

/// A CoNLL-X language and the L2 variance tuned for its treebank size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Short code, as used in file names.
    pub short: &'static str,
    /// Prior variance of the L2 regularizer.
    pub l2variance: i64,
}

/// CoNLL-X languages, smallest treebank first.
pub const CONLLX_LANGUAGES: [Language; 15] = [
    Language { short: "tr", l2variance: 5000 },
    Language { short: "sl", l2variance: 1500 },
    Language { short: "ar", l2variance: 1500 },
    Language { short: "ja", l2variance: 17000 },
    Language { short: "da", l2variance: 5200 },
    Language { short: "nl", l2variance: 13300 },
    Language { short: "bg", l2variance: 12800 },
    Language { short: "sv", l2variance: 11000 },
    Language { short: "es", l2variance: 3300 },
    Language { short: "pt", l2variance: 9100 },
    Language { short: "zh", l2variance: 57000 },
    Language { short: "de", l2variance: 39200 },
    Language { short: "cs", l2variance: 72700 },
    Language { short: "en", l2variance: 40000 },
    Language { short: "en-st", l2variance: 40000 },
];

/// CoNLL-2007 languages.
pub const CONLL07_LANGUAGES: [Language; 10] = [
    Language { short: "ar", l2variance: 2900 },
    Language { short: "eu", l2variance: 3200 },
    Language { short: "ca", l2variance: 15000 },
    Language { short: "zh", l2variance: 57000 },
    Language { short: "cs", l2variance: 25400 },
    Language { short: "en", l2variance: 18600 },
    Language { short: "el", l2variance: 2700 },
    Language { short: "hu", l2variance: 6000 },
    Language { short: "it", l2variance: 3100 },
    Language { short: "tr", l2variance: 5600 },
];

/// Looks up a CoNLL-X language.
///
/// # Errors
///
/// Returns an error for languages outside the shared task.
pub fn conllx_language(short: &str) -> Result<Language, ConfigError> {
    CONLLX_LANGUAGES
        .iter()
        .find(|l| l.short == short)
        .copied()
        .ok_or_else(|| ConfigError::invalid("language", format!("'{short}' is not a CoNLL-X language")))
}

/// Applies the name and argument visibility shared by every stage.
pub fn apply_visibility(params: &mut ParamSet) {
    for key in HIDDEN_NAME_KEYS {
        params.set_incl_name(key, false);
    }
    for key in HIDDEN_ARG_KEYS {
        params.set_incl_arg(key, false);
    }
}

/// Output files and bookkeeping every run starts from.
#[must_use]
pub fn base(ctx: &ExperimentContext) -> ParamSet {
    let mut p = ParamSet::new().with_initial_keys(INITIAL_KEYS);
    p.put("seed", ctx.seed)
        .put("printModel", "./model.txt")
        .put("trainPredOut", "./train-pred.txt")
        .put("testPredOut", "./test-pred.txt")
        .put("trainGoldOut", "./train-gold.txt")
        .put("testGoldOut", "./test-gold.txt")
        .put("modelOut", format!("./{MODEL_FILE}"));
    p.set("timeoutSeconds", 8 * 60 * 60, false, false);
    p
}

/// Defaults of every dependency parsing run.
#[must_use]
pub fn defaults(ctx: &ExperimentContext) -> ParamSet {
    let mut p = base(ctx) + feat_mcdonald() + adagrad_comid();
    p.put("featureSelection", false)
        .put("useGoldSyntax", true)
        .put("adaGradEta", 0.05)
        .put("featureHashMod", 20_000_000)
        .put("sgdNumPasses", 5)
        .put("l2variance", 10_000)
        .put("sgdAutoSelecFreq", 5)
        .put("sgdAutoSelectLr", true)
        .put("pruneByDist", true)
        .put("useLogAddTable", false)
        .put("acl14DepFeats", false)
        .put("normalizeMessages", true)
        .put("algebra", "LOG_SIGN")
        .put("includeUnsupportedFeatures", true)
        .put("singleRoot", false)
        .put("inference", "BP");
    p.remove("printModel");
    p + mst_car_feats()
}

/// Shortens sentences for the optimizer studies and fixes their memory.
#[must_use]
pub fn short_sentences(work_mem_megs: i64) -> ParamSet {
    let mut p = ParamSet::new();
    p.put("trainMaxSentenceLength", 20)
        .put("devMaxSentenceLength", 20)
        .put("testMaxSentenceLength", 20);
    p.set("work_mem_megs", work_mem_megs, false, false);
    p
}

/// CoNLL-X data of one language.
///
/// # Errors
///
/// Returns an error for languages outside the shared task.
pub fn cx_data(ctx: &ExperimentContext, short: &str) -> Result<ParamSet, ConfigError> {
    let language = conllx_language(short)?;
    let dir = ctx.conllx_dir(short);
    let mut p = ParamSet::new();
    p.put("train", display(&dir.join("train.conll")))
        .put("trainType", "CONLL_X")
        .put("devType", "CONLL_X")
        .put("test", display(&dir.join("test.conll")))
        .put("testType", "CONLL_X")
        .put("datasource", "CoNLL-X")
        .put("language", short)
        .put("l2variance", language.l2variance)
        .put("prune_model_path", display(&ctx.prune_model_path(short)));
    if short.starts_with("en") {
        p.put("dev", display(&dir.join("dev.conll")))
            .put("reduceTags", display(&ctx.tag_map("en-ptb")))
            .put("dpSkipPunctuation", true)
            .put("useGoldSyntax", false)
            .put("useMorphologicalFeats", false)
            .put("useLemmaFeats", false);
    } else {
        p.put("propTrainAsDev", 0.1)
            .put("reduceTags", display(&ctx.tag_map(&format!("{short}-cx"))));
    }
    Ok(p)
}

/// CoNLL-2007 data of one language.
///
/// # Errors
///
/// Returns an error for languages outside the shared task.
pub fn c07_data(ctx: &ExperimentContext, short: &str) -> Result<ParamSet, ConfigError> {
    let language = CONLL07_LANGUAGES
        .iter()
        .find(|l| l.short == short)
        .ok_or_else(|| ConfigError::invalid("language", format!("'{short}' is not a CoNLL-2007 language")))?;
    let dir = ctx.conll07_dir(short);
    let mut p = ParamSet::new();
    p.put("train", display(&dir.join("train.conll")))
        .put("trainType", "CONLL_X")
        .put("devType", "CONLL_X")
        .put("test", display(&dir.join("test.conll")))
        .put("testType", "CONLL_X")
        .put("datasource", "CoNLL-2007")
        .put("propTrainAsDev", 0.1)
        .put("language", short)
        .put("l2variance", language.l2variance)
        .put("reduceTags", display(&ctx.tag_map(&format!("{short}-c07"))))
        .put("prune_model_path", display(&ctx.c07_prune_model_path(short)));
    Ok(p)
}

// Parsers

/// First-order projective parser.
#[must_use]
pub fn first_order() -> ParamSet {
    let mut p = ParamSet::new();
    p.put("useProjDepTreeFactor", true)
        .put("linkVarType", "PREDICTED")
        .put("predAts", "DEP_TREE")
        .put("removeAts", "DEPREL")
        .put("tagger_parser", "1st")
        .put("pruneByModel", false)
        .put("bpUpdateOrder", "SEQUENTIAL")
        .put("bpSchedule", "TREE_LIKE")
        .put("bpMaxIterations", 1);
    p
}

/// The full second-order parser.
#[must_use]
pub fn second_order() -> ParamSet {
    let mut p = first_order();
    p.put("grandparentFactors", true)
        .put("siblingFactors", true)
        .put("tagger_parser", "2nd-gra-asib-hb")
        .put("bpMaxIterations", 5)
        .put("useMseForValue", true);
    p
}

/// Second-order parser with grandparent and sibling factors.
#[must_use]
pub fn second_grand_asib() -> ParamSet {
    let mut p = second_order();
    p.put("tagger_parser", "2nd-gra-asib");
    p
}

/// Second-order parser with grandparent factors only.
#[must_use]
pub fn second_grand() -> ParamSet {
    let mut p = second_order();
    p.put("siblingFactors", false).put("tagger_parser", "2nd-gra");
    p
}

/// [`second_grand`] decoded exactly by dynamic programming.
#[must_use]
pub fn second_grand_exact() -> ParamSet {
    let mut p = second_grand();
    p.put("inference", "DP");
    p
}

/// Second-order parser with sibling factors only.
#[must_use]
pub fn second_asib() -> ParamSet {
    let mut p = second_order();
    p.put("grandparentFactors", false).put("tagger_parser", "2nd-asib");
    p
}

/// Parsers trained without a pruning model.
#[must_use]
pub fn unpruned_parsers() -> Vec<ParamSet> {
    vec![
        first_order(),
        second_grand_asib(),
        second_asib(),
        second_grand_exact(),
        second_grand(),
    ]
}

/// Prunes `parser` with a first-order model.
#[must_use]
pub fn pruned(parser: &ParamSet) -> ParamSet {
    let tagger_parser = format!("{}-pr", parser.get_str("tagger_parser").unwrap_or("parser"));
    let mut p = parser.clone();
    p.put("pruneByModel", true).put("tagger_parser", tagger_parser);
    p
}

/// Every unpruned parser, pruned.
#[must_use]
pub fn pruned_parsers() -> Vec<ParamSet> {
    unpruned_parsers().iter().map(pruned).collect()
}

/// True for parsers with factors beyond first order.
#[must_use]
pub fn is_higher_order(parser: &ParamSet) -> bool {
    parser
        .get_str("tagger_parser")
        .is_some_and(|t| t.starts_with("2nd"))
}

// Trainers

/// Empirical risk minimization with the annealed decoding loss.
#[must_use]
pub fn erma_dp() -> ParamSet {
    let mut p = erma_dp_nomse();
    p.put("dpAnnealMse", true);
    p
}

/// [`erma_dp`] without annealing towards mean squared error.
#[must_use]
pub fn erma_dp_nomse() -> ParamSet {
    let mut p = ParamSet::new();
    p.put("trainer", "ERMA")
        .put("dpLoss", "DP_DECODE_LOSS")
        .put("dpStartTemp", 0.1)
        .put("dpEndTemp", 0.0001)
        .put("dpUseLogScale", false)
        .put("dpAnnealMse", false)
        .put("trainProjectivize", false);
    p
}

/// Empirical risk minimization with mean squared error.
#[must_use]
pub fn erma_mse() -> ParamSet {
    let mut p = ParamSet::new();
    p.put("trainer", "ERMA")
        .put("dpLoss", "MSE")
        .put("trainProjectivize", false);
    p
}

/// Empirical risk minimization with expected recall.
#[must_use]
pub fn erma_er() -> ParamSet {
    let mut p = ParamSet::new();
    p.put("trainer", "ERMA")
        .put("dpLoss", "EXPECTED_RECALL")
        .put("trainProjectivize", false);
    p
}

/// Conditional log-likelihood.
#[must_use]
pub fn cll() -> ParamSet {
    let mut p = ParamSet::new();
    p.put("trainer", "CLL").put("trainProjectivize", true);
    p
}

/// True for conditional log-likelihood training.
#[must_use]
pub fn is_cll(trainer: &ParamSet) -> bool {
    trainer.get_str("trainer") == Some("CLL")
}

// Optimizers

fn optimizer(name: &str) -> ParamSet {
    let mut p = ParamSet::new();
    p.put("optimizer", name);
    p
}

/// AdaGrad with composite mirror descent.
#[must_use]
pub fn adagrad_comid() -> ParamSet {
    optimizer("ADAGRAD_COMID")
}

/// Plain AdaGrad.
#[must_use]
pub fn adagrad() -> ParamSet {
    optimizer("ADAGRAD")
}

/// Stochastic gradient descent.
#[must_use]
pub fn sgd() -> ParamSet {
    optimizer("SGD")
}

/// Averaged stochastic gradient descent.
#[must_use]
pub fn asgd() -> ParamSet {
    optimizer("ASGD")
}

/// Forward-backward splitting.
#[must_use]
pub fn fobos() -> ParamSet {
    optimizer("FOBOS")
}

// Feature sets

/// McDonald's first-order templates.
#[must_use]
pub fn feat_mcdonald() -> ParamSet {
    let mut p = ParamSet::new();
    p.put("feature_set", "mcdonald")
        .put("useMstFeats", true)
        .put("useCarerrasFeats", false)
        .put("useCoarseTags", false);
    p
}

/// The basic subset of [`feat_mcdonald`].
#[must_use]
pub fn feat_mcdonald_basic() -> ParamSet {
    let mut p = feat_mcdonald();
    p.put("feature_set", "mcdonald-basic").put("basicOnly", true);
    p
}

/// MST and Carreras templates over coarse tags.
#[must_use]
pub fn mst_car_feats() -> ParamSet {
    let mut p = ParamSet::new();
    p.put("feature_set", "mst-car")
        .put("useMstFeats", true)
        .put("useCarerrasFeats", true)
        .put("useCoarseTags", true);
    p
}

/// The basic subset of [`mst_car_feats`], used by pruning models.
#[must_use]
pub fn basic_car_feats() -> ParamSet {
    let mut p = mst_car_feats();
    p.put("feature_set", "basic-car").put("basicOnly", true);
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use pretty_assertions::assert_eq;

    fn ctx() -> ExperimentContext {
        ExperimentContext::from_config(&RunnerConfig::default().with_root_dir("/proj")).with_seed(42)
    }

    #[test]
    fn test_parser_family() {
        assert_eq!(second_grand().get_bool("siblingFactors"), Some(false));
        assert_eq!(second_grand().get_bool("grandparentFactors"), Some(true));
        assert_eq!(second_grand_exact().get_str("inference"), Some("DP"));
        assert_eq!(second_asib().get_str("tagger_parser"), Some("2nd-asib"));
        assert_eq!(first_order().get_i64("bpMaxIterations"), Some(1));
        assert!(!is_higher_order(&first_order()));
        assert!(is_higher_order(&pruned(&second_grand())));

        let names: Vec<String> = pruned_parsers()
            .iter()
            .filter_map(|p| p.get_str("tagger_parser").map(ToString::to_string))
            .collect();
        assert_eq!(names, vec!["1st-pr", "2nd-gra-asib-pr", "2nd-asib-pr", "2nd-gra-pr", "2nd-gra-pr"]);
        assert!(pruned_parsers().iter().all(|p| p.get_bool("pruneByModel") == Some(true)));
    }

    #[test]
    fn test_groups_are_fresh() {
        let mut a = first_order();
        a.put("bpMaxIterations", 9);
        assert_eq!(first_order().get_i64("bpMaxIterations"), Some(1));
    }

    #[test]
    fn test_defaults_compose_right_biased() {
        let p = defaults(&ctx()) + cll();
        assert_eq!(p.get_str("feature_set"), Some("mst-car"));
        assert_eq!(p.get_str("optimizer"), Some("ADAGRAD_COMID"));
        assert_eq!(p.get_i64("seed"), Some(42));
        assert!(!p.contains_key("printModel"));
        assert_eq!(p.flags("timeoutSeconds"), Some((false, false)));
        assert!(is_cll(&p));
    }

    #[test]
    fn test_cx_data_per_language() {
        let en = cx_data(&ctx(), "en").unwrap();
        assert_eq!(en.get_str("dev"), Some("/proj/data/conllx/en/dev.conll"));
        assert_eq!(en.get_bool("useGoldSyntax"), Some(false));
        assert!(!en.contains_key("propTrainAsDev"));

        let bg = cx_data(&ctx(), "bg").unwrap();
        assert_eq!(bg.get_i64("l2variance"), Some(12800));
        assert_eq!(bg.get_f64("propTrainAsDev"), Some(0.1));
        assert_eq!(bg.get_str("reduceTags"), Some("/proj/data/tag_maps/bg-cx.map"));

        assert!(matches!(cx_data(&ctx(), "xx"), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_c07_data_per_language() {
        let eu = c07_data(&ctx(), "eu").unwrap();
        assert_eq!(eu.get_str("train"), Some("/proj/data/conll2007/eu/train.conll"));
        assert_eq!(eu.get_str("datasource"), Some("CoNLL-2007"));
        assert_eq!(eu.get_i64("l2variance"), Some(3200));
        assert_eq!(eu.get_f64("propTrainAsDev"), Some(0.1));
        assert_eq!(eu.get_str("reduceTags"), Some("/proj/data/tag_maps/eu-c07.map"));
        assert!(eu.get_str("prune_model_path").unwrap().ends_with("1st_c07_eu/model.binary.gz"));

        assert!(c07_data(&ctx(), "bg").is_err());
    }

    #[test]
    fn test_visibility_hides_paths_and_labels() {
        let mut p = defaults(&ctx()) + cx_data(&ctx(), "bg").unwrap() + first_order() + cll();
        apply_visibility(&mut p);
        let name = p.get_name();
        assert!(name.starts_with("language_bg_tagger_parser_1st_trainer_CLL_feature_set_mst-car_"));
        assert!(!name.contains("train_-proj"));
        assert!(!name.contains("seed"));

        let args = p.get_args_preview();
        assert!(!args.contains(&"--tagger_parser".to_string()));
        assert!(!args.contains(&"--datasource".to_string()));
        assert!(args.contains(&"--train".to_string()));
        assert!(args.contains(&"--seed".to_string()));
    }
}
