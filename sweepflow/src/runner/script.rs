//! Rendering of per-stage `run.sh` scripts.

use std::path::{Path, PathBuf};

use crate::config::{Profiling, RunnerConfig};
use crate::core::StageKind;
use crate::graph::{Stage, DONE_MARKER};
use crate::resources::ResourcePlan;

/// Name of the rendered script inside each stage directory.
pub const SCRIPT_NAME: &str = "run.sh";
/// Captured standard output.
pub const STDOUT_LOG: &str = "stdout.log";
/// Captured standard error.
pub const STDERR_LOG: &str = "stderr.log";

/// Renders the shell script a stage runs as.
#[derive(Debug, Clone)]
pub struct ScriptRenderer {
    root_dir: PathBuf,
    classpath: Vec<String>,
    jvm_args: Vec<String>,
    heap_fraction: f64,
    main_class: String,
    profiling: Option<Profiling>,
}

impl ScriptRenderer {
    /// Creates a renderer from the run configuration.
    #[must_use]
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            classpath: config.java.classpath.clone(),
            jvm_args: config.java.jvm_args.clone(),
            heap_fraction: config.java.heap_fraction,
            main_class: config.java.main_class.clone(),
            profiling: config.profiling,
        }
    }

    /// Heap size handed to the JVM.
    #[must_use]
    pub fn heap_megs(&self, plan: &ResourcePlan) -> u64 {
        (plan.work_mem_megs as f64 * self.heap_fraction).floor() as u64
    }

    /// Renders the script for `stage` running in `dir` with resolved `args`.
    #[must_use]
    pub fn render(&self, stage: &Stage, dir: &Path, plan: &ResourcePlan, args: &[String]) -> String {
        let mut lines = vec![
            "#!/bin/bash".to_string(),
            format!("#$ -N {}", job_name(stage)),
            format!("#$ -l mem_free={}M,h_rt={}", plan.work_mem_megs, plan.runtime()),
            format!("#$ -pe smp {}", plan.threads),
        ];
        if let Some(queue) = &plan.queue {
            lines.push(format!("#$ -q {queue}"));
        }
        lines.push(String::new());
        lines.push("set -e".to_string());
        lines.push(format!("cd {}", quote(&dir.display().to_string())));
        // Outputs shared across experiments live outside the stage directory.
        if let Some(parent) = stage
            .output()
            .map(Path::new)
            .filter(|o| o.is_absolute())
            .and_then(Path::parent)
        {
            lines.push(format!("mkdir -p {}", quote(&parent.display().to_string())));
        }

        let command = match stage.kind() {
            // Scrape commands are command lines of their own.
            StageKind::Scrape => vec![stage.entry_point().unwrap_or("true").to_string()],
            _ => {
                lines.push(format!("export CLASSPATH={}", quote(&self.classpath())));
                self.java_command(stage, plan)
            }
        };

        lines.push(String::new());
        let mut invocation = command.join(" ");
        for pair in args.chunks(2) {
            invocation.push_str(" \\\n    ");
            invocation.push_str(
                &pair
                    .iter()
                    .map(|s| quote(s))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }
        invocation.push_str(&format!(" \\\n    > {STDOUT_LOG} 2> {STDERR_LOG}"));
        lines.push(invocation);

        if stage.output() == Some(DONE_MARKER) {
            lines.push(String::new());
            lines.push(format!("touch {DONE_MARKER}"));
        }
        lines.push(String::new());
        lines.join("\n")
    }

    fn classpath(&self) -> String {
        self.classpath
            .iter()
            .map(|entry| self.root_dir.join(entry).display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    fn java_command(&self, stage: &Stage, plan: &ResourcePlan) -> Vec<String> {
        let mut command = vec![
            "java".to_string(),
            "-cp".to_string(),
            "\"$CLASSPATH\"".to_string(),
            format!("-Xmx{}m", self.heap_megs(plan)),
        ];
        if let Some(profiling) = self.profiling {
            command.push(profiling.jvm_flag().to_string());
        }
        command.extend(self.jvm_args.iter().map(|a| quote(a)));
        command.push(quote(stage.entry_point().unwrap_or(&self.main_class)));
        command
    }
}

/// Queue job name: the directory name, which starts with a letter for SGE.
#[must_use]
pub fn job_name(stage: &Stage) -> String {
    let label = stage.label();
    if label.starts_with(|c: char| c.is_ascii_alphabetic()) {
        label
    } else {
        format!("s{}", label.trim_start_matches('#'))
    }
}

/// Single-quotes a shell word unless it is plainly safe.
#[must_use]
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | '+' | ':' | ','));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{StageGraph, StageId, StageSpec};
    use crate::params;
    use crate::params::ParamSet;

    fn plan() -> ResourcePlan {
        ResourcePlan {
            work_mem_megs: 4000,
            threads: 2,
            minutes: 90,
            queue: Some("all.q".to_string()),
        }
    }

    fn frozen(spec: StageSpec) -> (StageGraph, StageId) {
        let mut graph = StageGraph::new();
        let id = graph.add_experiment(spec).unwrap();
        graph.freeze().unwrap();
        graph.assign_directories(Path::new("/exp/dp")).unwrap();
        (graph, id)
    }

    #[test]
    fn test_java_script_layout() {
        let config = RunnerConfig::default()
            .with_root_dir("/proj")
            .with_profiling(Some(Profiling::Cpu));
        let (graph, id) = frozen(StageSpec::experiment(params! { "model" => "o 2" }));
        let stage = graph.get(id).unwrap();
        let args = stage.params().get_args(&graph).unwrap();
        let script = ScriptRenderer::new(&config).render(stage, Path::new("/exp/dp/model_o-2"), &plan(), &args);

        assert!(script.starts_with("#!/bin/bash\n#$ -N model_o-2\n"));
        assert!(script.contains("#$ -l mem_free=4000M,h_rt=01:30:00"));
        assert!(script.contains("#$ -pe smp 2"));
        assert!(script.contains("#$ -q all.q"));
        assert!(script.contains("cd /exp/dp/model_o-2"));
        assert!(script.contains("export CLASSPATH='/proj/target/classes:/proj/lib/*'"));
        assert!(script.contains("java -cp \"$CLASSPATH\" -Xmx3000m -agentlib:hprof=cpu"));
        assert!(script.contains("edu.jhu.srl.SrlRunner \\\n    --model 'o 2' \\\n    > stdout.log 2> stderr.log"));
        assert!(script.trim_end().ends_with("touch DONE"));
    }

    #[test]
    fn test_scrape_script_has_no_marker() {
        let mut graph = StageGraph::new();
        let exp = graph.add_experiment(StageSpec::experiment(params! { "a" => 1 })).unwrap();
        let scrape = graph
            .add_scrape_stage(
                StageSpec::scrape(params! { "csv_file" => "results.csv" }, "scrape-results"),
                [exp],
            )
            .unwrap();
        graph.freeze().unwrap();
        graph.assign_directories(Path::new("/exp")).unwrap();

        let stage = graph.get(scrape).unwrap();
        let args = stage.params().get_args(&graph).unwrap();
        let script = ScriptRenderer::new(&RunnerConfig::default()).render(stage, Path::new("/exp/scrape"), &plan(), &args);
        assert!(script.contains("scrape-results \\\n    --csv_file results.csv"));
        assert!(!script.contains("java"));
        assert!(!script.contains("touch"));
    }

    #[test]
    fn test_shared_output_directory_created() {
        let model = "/models/1st_cx_tr/model.binary.gz";
        let (graph, id) = frozen(StageSpec::experiment(params! { "modelOut" => model }).with_output(model));
        let stage = graph.get(id).unwrap();
        let args = stage.params().get_args(&graph).unwrap();
        let script = ScriptRenderer::new(&RunnerConfig::default()).render(stage, Path::new("/exp/dp/a"), &plan(), &args);
        assert!(script.contains("cd /exp/dp/a\nmkdir -p /models/1st_cx_tr\n"));
        assert!(!script.contains("touch"));
    }

    #[test]
    fn test_job_name_and_quote() {
        let stage = {
            let (graph, id) = frozen(StageSpec::experiment(ParamSet::new()));
            graph.get(id).unwrap().clone()
        };
        assert_eq!(job_name(&stage), "stage");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("/a/b.txt"), "/a/b.txt");
    }
}
