//! Out-of-memory escalation ladders.

use tracing::debug;

use super::ResourcePlanner;
use crate::errors::{GraphError, SweepflowError};
use crate::graph::{Escalation, StageGraph, StageId, StageSpec};

/// Key recording the rung of an escalation variant.
pub const OOME_TIER_KEY: &str = "oomeTier";

/// Escalation variants built for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OomeLadder {
    /// The stage the ladder was built from.
    pub base: StageId,
    /// Variants in increasing memory order.
    pub variants: Vec<StageId>,
    /// Memory of each variant, in the same order.
    pub work_mem_megs: Vec<u64>,
}

/// Memory per rung: doubled each time and capped at `max_megs`, strictly
/// increasing. The first two rungs may pass the cap so that every ladder
/// has at least two.
#[must_use]
pub fn ladder_megs(base_megs: u64, tiers: usize, max_megs: u64) -> Vec<u64> {
    let mut rungs = Vec::with_capacity(tiers.max(2));
    let mut previous = base_megs.max(1);
    for _ in 0..tiers.max(2) {
        let doubled = previous.saturating_mul(2);
        let capped = doubled.min(max_megs);
        let next = if capped > previous {
            capped
        } else if rungs.len() < 2 {
            doubled
        } else {
            break;
        };
        rungs.push(next);
        previous = next;
    }
    rungs
}

/// Adds escalation variants of `stage` as siblings sharing its
/// prerequisites.
///
/// Each variant differs from the base only in `work_mem_megs` and
/// [`OOME_TIER_KEY`], both part of its name. The tier is never passed to
/// the executable, and memory is passed only if the base passed it.
/// Variants are marked with an [`Escalation`] so the runner holds them
/// until an operator selects one.
///
/// # Errors
///
/// Returns an error if the graph is frozen, the stage is unknown, or its
/// base memory cannot be estimated.
pub fn get_oome_stages(
    graph: &mut StageGraph,
    stage: StageId,
    planner: &ResourcePlanner,
) -> Result<OomeLadder, SweepflowError> {
    if graph.is_frozen() {
        return Err(GraphError::frozen("build an escalation ladder").into());
    }
    let base = graph.get(stage)?.clone();
    let base_megs = planner
        .work_mem_megs(base.params())
        .map_err(|e| e.for_stage(base.name()))?;
    let config = planner.config();
    let rungs = ladder_megs(base_megs, config.escalation_tiers, config.max_work_mem_megs);

    let mut ladder = OomeLadder {
        base: stage,
        variants: Vec::with_capacity(rungs.len()),
        work_mem_megs: rungs.clone(),
    };
    for (index, megs) in rungs.into_iter().enumerate() {
        let tier = index + 1;
        let mut params = base.params().clone();
        let (_, pass_megs) = params.flags("work_mem_megs").unwrap_or((true, false));
        params.set("work_mem_megs", megs, true, pass_megs);
        params.set(OOME_TIER_KEY, tier, true, false);

        let spec = StageSpec {
            kind: base.kind(),
            params,
            entry_point: base.entry_point().map(ToString::to_string),
            output: base.output().map(ToString::to_string),
            escalation: Some(Escalation { base: stage, tier }),
        };
        let id = graph.add_stage(spec)?;
        graph.add_prereqs(id, base.prereqs().iter().copied())?;
        ladder.variants.push(id);
    }

    debug!(stage = %stage, variants = ladder.variants.len(), "Built escalation ladder");
    Ok(ladder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::params;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ladder_megs() {
        assert_eq!(ladder_megs(2000, 3, 51200), vec![4000, 8000, 16000]);
        assert_eq!(ladder_megs(20000, 3, 51200), vec![40000, 51200]);
        assert_eq!(ladder_megs(60000, 3, 51200), vec![120000, 240000]);
        assert_eq!(ladder_megs(1000, 1, 51200), vec![2000, 4000]);
    }

    #[test]
    fn test_variants_are_siblings_with_more_memory() {
        let mut graph = StageGraph::new();
        let parent = graph
            .add_experiment(crate::graph::StageSpec::experiment(params! { "prune" => true }))
            .unwrap();
        let exp = graph
            .add_stage(StageSpec::experiment(
                params! { "model" => "o2", "work_mem_megs" => 3000 },
            ))
            .unwrap();
        graph.add_prereq(exp, parent).unwrap();

        let planner = ResourcePlanner::new(ResourceConfig::default());
        let ladder = get_oome_stages(&mut graph, exp, &planner).unwrap();
        assert_eq!(ladder.variants.len(), 3);
        assert_eq!(ladder.work_mem_megs, vec![6000, 12000, 24000]);

        let base_args = graph.get(exp).unwrap().params().get_args_preview();
        for (i, id) in ladder.variants.iter().enumerate() {
            let variant = graph.get(*id).unwrap();
            assert_eq!(variant.prereqs(), &[parent]);
            assert_eq!(variant.escalation(), Some(Escalation { base: exp, tier: i + 1 }));
            assert!(variant.name().contains(&format!("oomeTier_{}", i + 1)));

            let mut params = variant.params().clone();
            params.remove(OOME_TIER_KEY);
            params.put("work_mem_megs", 3000);
            assert_eq!(params.get_args_preview(), base_args);
        }
        assert_eq!(graph.get(parent).unwrap().dependents().len(), 4);
    }

    #[test]
    fn test_frozen_graph_rejected() {
        let mut graph = StageGraph::new();
        let exp = graph
            .add_experiment(StageSpec::experiment(params! { "work_mem_megs" => 100 }))
            .unwrap();
        graph.freeze().unwrap();
        let planner = ResourcePlanner::default();
        assert!(get_oome_stages(&mut graph, exp, &planner).is_err());
    }
}
