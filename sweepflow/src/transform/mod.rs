//! Pure rewrites of experiment parameters.

mod fast_mode;
mod small_machine;

pub use fast_mode::FastMode;
pub use small_machine::SmallMachine;

use crate::core::{ParamValue, StageKind};
use crate::errors::GraphError;
use crate::graph::{Escalation, StageGraph, StageId};
use crate::params::ParamSet;
use crate::resources::ladder_megs;

/// Overrides read by the runner rather than the executable.
const RUNNER_KEYS: [&str; 2] = ["work_mem_megs", "timeoutSeconds"];

/// Writes an override. Existing keys keep their flags; added keys stay out
/// of the name, and runner settings out of the arguments.
fn put_override(params: &mut ParamSet, key: &str, value: impl Into<ParamValue>) {
    if params.contains_key(key) {
        params.put(key, value);
    } else {
        params.set(key, value, false, !RUNNER_KEYS.contains(&key));
    }
}

/// Applies `rewrite` to every parser stage of an unfrozen graph, that is
/// every experiment stage running the default entry point.
///
/// Escalation variants are rewritten after their bases, then get their
/// rung's memory back on top of the rewritten base memory so the ladder
/// stays strictly increasing. Returns the number of stages rewritten.
fn rewrite_parser_stages<F>(graph: &mut StageGraph, rewrite: F) -> Result<usize, GraphError>
where
    F: Fn(&mut ParamSet),
{
    let (variants, bases): (Vec<(StageId, Option<Escalation>)>, Vec<_>) = graph
        .iter()
        .filter(|s| s.kind() == StageKind::Experiment && s.entry_point().is_none())
        .map(|s| (s.id(), s.escalation()))
        .partition(|(_, escalation)| escalation.is_some());

    for (id, _) in &bases {
        rewrite(graph.params_mut(*id)?);
    }
    for (id, escalation) in &variants {
        let Some(Escalation { base, tier }) = *escalation else {
            continue;
        };
        let base_megs = graph
            .params(base)?
            .get_i64("work_mem_megs")
            .and_then(|m| u64::try_from(m).ok());
        let params = graph.params_mut(*id)?;
        rewrite(params);
        let rung = base_megs.and_then(|megs| ladder_megs(megs, tier, u64::MAX).get(tier - 1).copied());
        if let Some(megs) = rung.and_then(|m| i64::try_from(m).ok()) {
            params.put("work_mem_megs", megs);
        }
    }
    Ok(bases.len() + variants.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::graph::StageSpec;
    use crate::params;
    use crate::resources::{get_oome_stages, ResourcePlanner};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_added_keys_hidden_from_name() {
        let mut p = params! { "model" => "o2" };
        put_override(&mut p, "trainMaxNumSentences", 3);
        put_override(&mut p, "work_mem_megs", 2000);
        put_override(&mut p, "model", "o1");
        assert_eq!(p.flags("trainMaxNumSentences"), Some((false, true)));
        assert_eq!(p.flags("work_mem_megs"), Some((false, false)));
        assert_eq!(p.flags("model"), Some((true, true)));
        assert_eq!(p.get_name(), "model_o1");
    }

    #[test]
    fn test_variants_keep_increasing_ladder() {
        let mut graph = StageGraph::new();
        let exp = graph
            .add_experiment(StageSpec::experiment(params! { "model" => "o2", "work_mem_megs" => 9000 }))
            .unwrap();
        let ladder = get_oome_stages(&mut graph, exp, &ResourcePlanner::new(ResourceConfig::default())).unwrap();

        let rewritten = rewrite_parser_stages(&mut graph, |p| {
            p.put("work_mem_megs", 1000);
        })
        .unwrap();
        assert_eq!(rewritten, 4);

        let megs: Vec<Option<i64>> = std::iter::once(exp)
            .chain(ladder.variants.iter().copied())
            .map(|id| graph.params(id).unwrap().get_i64("work_mem_megs"))
            .collect();
        assert_eq!(megs, vec![Some(1000), Some(2000), Some(4000), Some(8000)]);

        let names: Vec<String> = ladder.variants.iter().map(|id| graph.get(*id).unwrap().name()).collect();
        assert_eq!(names[0], "model_o2_oomeTier_1_work_mem_megs_2000");
    }

    #[test]
    fn test_custom_entry_points_untouched() {
        let mut graph = StageGraph::new();
        let tool = graph
            .add_experiment(StageSpec::experiment(params! { "megsToGobble" => 300 }).with_entry_point("Gobble"))
            .unwrap();
        let parser = graph.add_experiment(StageSpec::experiment(params! { "model" => "o2" })).unwrap();

        let rewritten = rewrite_parser_stages(&mut graph, |p| {
            p.put("threads", 1);
        })
        .unwrap();
        assert_eq!(rewritten, 1);
        assert!(!graph.params(tool).unwrap().contains_key("threads"));
        assert_eq!(graph.params(parser).unwrap().get_i64("threads"), Some(1));
    }
}
