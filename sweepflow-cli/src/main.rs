//! Command line driver: builds one named experiment and dispatches it.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use sweepflow::config::{Profiling, RunnerConfig};
use sweepflow::experiments::{ExperimentContext, ExperimentKind};
use sweepflow::observability::{init_tracing, LogFormat};
use sweepflow::runner::Runner;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sweepflow", version, about = "Build and dispatch experiment sweeps")]
struct Cli {
    /// Experiment to build and run.
    #[arg(short = 'e', long, required_unless_present = "list")]
    expname: Option<ExperimentKind>,
    /// Queue to submit to; without one, stages run locally.
    #[arg(short, long)]
    queue: Option<String>,
    /// Shrink every stage to a smoke test.
    #[arg(short, long)]
    fast: bool,
    /// JVM profiling mode (cpu or heap).
    #[arg(long = "hprof", value_name = "MODE")]
    profiling: Option<Profiling>,
    /// Render scripts without submitting anything.
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// Cap parser stages to 1100 MB and one thread.
    #[arg(long)]
    small_machine: bool,
    /// JSON configuration file; flags override its values.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory under which experiment directories are created.
    #[arg(long, value_name = "DIR")]
    experiment_root: Option<PathBuf>,
    /// Project checkout holding the classpath and data.
    #[arg(long, value_name = "DIR")]
    root_dir: Option<PathBuf>,
    /// Submit a held out-of-memory variant, by directory name or path.
    #[arg(long, value_name = "VARIANT")]
    escalate: Vec<String>,
    /// Log one JSON object per event.
    #[arg(long)]
    log_json: bool,
    /// List the known experiments and exit.
    #[arg(long)]
    list: bool,
}

impl Cli {
    fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::from_json_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => RunnerConfig::default(),
        };
        if let Some(queue) = &self.queue {
            config = config.with_queue(queue.clone());
        }
        if let Some(root) = &self.experiment_root {
            config = config.with_experiment_root(root.clone());
        }
        if let Some(root) = &self.root_dir {
            config = config.with_root_dir(root.clone());
        }
        if self.fast {
            config = config.with_fast(true);
        }
        if self.dry_run {
            config = config.with_dry_run(true);
        }
        if self.small_machine {
            config = config.with_small_machine(true);
        }
        if self.profiling.is_some() {
            config = config.with_profiling(self.profiling);
        }
        for variant in &self.escalate {
            config = config.with_escalation(variant.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn list_experiments() {
    for kind in ExperimentKind::ALL {
        println!("{:<16} {}", kind.as_str(), kind.description());
    }
}

fn run(cli: &Cli, kind: ExperimentKind) -> Result<ExitCode> {
    let config = cli.runner_config()?;
    let ctx = ExperimentContext::from_config(&config).with_heuristic(kind.heuristic());
    info!(experiment = %kind, seed = ctx.seed, fast = config.fast, "Building experiment");
    let mut graph = kind
        .build(&ctx)
        .with_context(|| format!("building experiment {kind}"))?;

    let experiment_dir = config.experiment_dir(kind.as_str());
    let runner = Runner::new(config).with_planner(ctx.planner.clone());
    let report = runner
        .run(&mut graph, &experiment_dir)
        .with_context(|| format!("running experiment {kind}"))?;

    println!("{}", report.summary());
    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        for stage in report.failed() {
            warn!(stage = %stage.label, outcome = ?stage.outcome, "Stage did not go through");
        }
        Ok(ExitCode::FAILURE)
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(LogFormat::from_json_flag(cli.log_json));

    if cli.list {
        list_experiments();
        return Ok(ExitCode::SUCCESS);
    }
    match cli.expname {
        Some(kind) => run(&cli, kind),
        None => {
            list_experiments();
            Ok(ExitCode::FAILURE)
        }
    }
}
