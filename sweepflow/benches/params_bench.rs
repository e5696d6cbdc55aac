//! Benchmarks for parameter composition and naming.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sweepflow::config::RunnerConfig;
use sweepflow::experiments::{defs, ExperimentContext};
use sweepflow::graph::{StageGraph, StageSpec};
use sweepflow::params;
use sweepflow::params::ParamSet;

fn sample_layers() -> Vec<ParamSet> {
    let ctx = ExperimentContext::from_config(&RunnerConfig::default()).with_seed(1);
    vec![
        defs::defaults(&ctx),
        defs::first_order(),
        defs::cll(),
        defs::adagrad(),
        params! { "language" => "bg", "threads" => 4, "sgdBatchSize" => 20 },
    ]
}

fn composition_benchmark(c: &mut Criterion) {
    let layers = sample_layers();
    c.bench_function("compose_five_layers", |b| {
        b.iter(|| {
            let composed = layers.iter().fold(ParamSet::new(), |acc, layer| &acc + layer);
            black_box(composed)
        })
    });
}

fn naming_benchmark(c: &mut Criterion) {
    let composed = sample_layers()
        .iter()
        .fold(ParamSet::new(), |acc, layer| &acc + layer);
    c.bench_function("get_name", |b| b.iter(|| black_box(composed.get_name())));
    c.bench_function("get_args_preview", |b| {
        b.iter(|| black_box(composed.get_args_preview()))
    });
}

fn freeze_benchmark(c: &mut Criterion) {
    c.bench_function("freeze_wide_graph", |b| {
        b.iter(|| {
            let mut graph = StageGraph::new();
            for i in 0..200 {
                let _ = graph.add_experiment(StageSpec::experiment(params! { "i" => i }));
            }
            black_box(graph.freeze().is_ok())
        })
    });
}

criterion_group!(benches, composition_benchmark, naming_benchmark, freeze_benchmark);
criterion_main!(benches);
