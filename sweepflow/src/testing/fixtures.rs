//! Graph fixtures.

use crate::errors::GraphError;
use crate::graph::{StageGraph, StageId, StageSpec};
use crate::params::ParamSet;

fn named(name: &str) -> StageSpec {
    let mut params = ParamSet::new();
    params.put("name", name);
    StageSpec::experiment(params)
}

/// Builds `root -> a -> b -> c`, each stage named after its letter.
pub fn chain_graph() -> Result<(StageGraph, [StageId; 3]), GraphError> {
    let mut graph = StageGraph::new();
    let a = graph.add_experiment(named("a"))?;
    let b = graph.add_stage(named("b"))?;
    let c = graph.add_stage(named("c"))?;
    graph.add_prereq(b, a)?;
    graph.add_prereq(c, b)?;
    Ok((graph, [a, b, c]))
}

/// Builds `root -> a`, `a -> b`, `a -> c` and `b, c -> d`.
pub fn diamond_graph() -> Result<(StageGraph, [StageId; 4]), GraphError> {
    let mut graph = StageGraph::new();
    let a = graph.add_experiment(named("a"))?;
    let b = graph.add_stage(named("b"))?;
    let c = graph.add_stage(named("c"))?;
    let d = graph.add_stage(named("d"))?;
    graph.add_dependents(a, [b, c])?;
    graph.add_prereqs(d, [b, c])?;
    Ok((graph, [a, b, c, d]))
}
