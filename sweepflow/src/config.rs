//! Runner configuration.
//!
//! Everything here is plain serde data with defaults, so a partial JSON
//! file is a valid configuration. The CLI layers its flags on top.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{ConfigError, SweepflowError};

/// JVM profiling mode passed through to the executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profiling {
    /// CPU sampling.
    Cpu,
    /// Heap allocation sites.
    Heap,
}

impl Profiling {
    /// Returns the JVM agent flag for this mode.
    #[must_use]
    pub fn jvm_flag(self) -> &'static str {
        match self {
            Self::Cpu => "-agentlib:hprof=cpu=samples,depth=7,interval=10",
            Self::Heap => "-agentlib:hprof=heap=sites,depth=7",
        }
    }
}

impl fmt::Display for Profiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Heap => write!(f, "heap"),
        }
    }
}

impl FromStr for Profiling {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Self::Cpu),
            "heap" => Ok(Self::Heap),
            other => Err(ConfigError::invalid(
                "hprof",
                format!("'{other}' is not a profiling mode (expected cpu or heap)"),
            )),
        }
    }
}

/// Defaults and limits used by the resource planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Slots requested when a stage sets no `threads`.
    #[serde(default = "default_threads")]
    pub default_threads: u32,
    /// Wall-clock minutes requested when a stage sets no `timeoutSeconds`.
    #[serde(default = "default_minutes")]
    pub default_minutes: u64,
    /// Upper bound for escalated memory.
    #[serde(default = "default_max_work_mem")]
    pub max_work_mem_megs: u64,
    /// Number of rungs on an out-of-memory ladder.
    #[serde(default = "default_escalation_tiers")]
    pub escalation_tiers: usize,
}

fn default_threads() -> u32 {
    1
}

fn default_minutes() -> u64 {
    24 * 60
}

fn default_max_work_mem() -> u64 {
    50 * 1024
}

fn default_escalation_tiers() -> usize {
    3
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            default_threads: default_threads(),
            default_minutes: default_minutes(),
            max_work_mem_megs: default_max_work_mem(),
            escalation_tiers: default_escalation_tiers(),
        }
    }
}

impl ResourceConfig {
    /// Sets the memory ceiling.
    #[must_use]
    pub fn with_max_work_mem_megs(mut self, megs: u64) -> Self {
        self.max_work_mem_megs = megs;
        self
    }

    /// Sets the number of escalation tiers.
    #[must_use]
    pub fn with_escalation_tiers(mut self, tiers: usize) -> Self {
        self.escalation_tiers = tiers;
        self
    }
}

/// How the rendered script invokes the JVM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaConfig {
    /// Share of the stage memory given to the heap.
    #[serde(default = "default_heap_fraction")]
    pub heap_fraction: f64,
    /// Classpath entries, relative to the project root.
    #[serde(default = "default_classpath")]
    pub classpath: Vec<String>,
    /// Extra JVM arguments placed before the main class.
    #[serde(default)]
    pub jvm_args: Vec<String>,
    /// Main class of stages that name none.
    #[serde(default = "default_main_class")]
    pub main_class: String,
}

fn default_heap_fraction() -> f64 {
    0.75
}

fn default_classpath() -> Vec<String> {
    vec!["target/classes".to_string(), "lib/*".to_string()]
}

fn default_main_class() -> String {
    "edu.jhu.srl.SrlRunner".to_string()
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            heap_fraction: default_heap_fraction(),
            classpath: default_classpath(),
            jvm_args: Vec::new(),
            main_class: default_main_class(),
        }
    }
}

/// Top-level configuration of a sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Queue name; no queue means stages run locally.
    #[serde(default)]
    pub queue: Option<String>,
    /// Directory under which each experiment gets its own directory.
    #[serde(default = "default_experiment_root")]
    pub experiment_root: PathBuf,
    /// Project checkout holding the classpath and data.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Shrink every stage to a smoke test.
    #[serde(default)]
    pub fast: bool,
    /// Render scripts without submitting.
    #[serde(default)]
    pub dry_run: bool,
    /// Cap parser stages to 1100 MB and one thread for a host with few
    /// cores. Dry runs are never capped.
    #[serde(default)]
    pub small_machine: bool,
    /// JVM profiling mode.
    #[serde(default)]
    pub profiling: Option<Profiling>,
    /// Command run by scrape stages.
    #[serde(default = "default_scrape_command")]
    pub scrape_command: String,
    /// Escalation variants selected for submission, by directory name.
    #[serde(default)]
    pub escalate: BTreeSet<String>,
    /// Resource defaults.
    #[serde(default)]
    pub resources: ResourceConfig,
    /// JVM settings.
    #[serde(default)]
    pub java: JavaConfig,
}

fn default_experiment_root() -> PathBuf {
    PathBuf::from("exp")
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_scrape_command() -> String {
    "scrape-results".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            queue: None,
            experiment_root: default_experiment_root(),
            root_dir: default_root_dir(),
            fast: false,
            dry_run: false,
            small_machine: false,
            profiling: None,
            scrape_command: default_scrape_command(),
            escalate: BTreeSet::new(),
            resources: ResourceConfig::default(),
            java: JavaConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, SweepflowError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns an error for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.java.heap_fraction > 0.0 && self.java.heap_fraction <= 1.0) {
            return Err(ConfigError::invalid(
                "java.heap_fraction",
                format!("{} is outside (0, 1]", self.java.heap_fraction),
            ));
        }
        if self.resources.default_threads == 0 {
            return Err(ConfigError::invalid("resources.default_threads", "must be at least 1"));
        }
        if self.resources.escalation_tiers < 2 {
            return Err(ConfigError::invalid("resources.escalation_tiers", "must be at least 2"));
        }
        if self.dry_run && !self.escalate.is_empty() {
            return Err(ConfigError::ConflictingFlags {
                message: "--escalate selects variants to submit, but --dry-run never submits".to_string(),
            });
        }
        Ok(())
    }

    /// Sets the queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Sets the experiment root.
    #[must_use]
    pub fn with_experiment_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.experiment_root = root.into();
        self
    }

    /// Sets the project root.
    #[must_use]
    pub fn with_root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = root.into();
        self
    }

    /// Enables fast mode.
    #[must_use]
    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Marks the host as a small machine.
    #[must_use]
    pub fn with_small_machine(mut self, small_machine: bool) -> Self {
        self.small_machine = small_machine;
        self
    }

    /// True when parser stages must be capped for a small machine.
    #[must_use]
    pub fn caps_small_machine(&self) -> bool {
        self.small_machine && !self.dry_run
    }

    /// Sets the profiling mode.
    #[must_use]
    pub fn with_profiling(mut self, profiling: Option<Profiling>) -> Self {
        self.profiling = profiling;
        self
    }

    /// Selects an escalation variant for submission.
    #[must_use]
    pub fn with_escalation(mut self, dir_name: impl Into<String>) -> Self {
        self.escalate.insert(dir_name.into());
        self
    }

    /// Replaces the resource defaults.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceConfig) -> Self {
        self.resources = resources;
        self
    }

    /// Directory of one named experiment, `fast_` prefixed in fast mode.
    #[must_use]
    pub fn experiment_dir(&self, expname: &str) -> PathBuf {
        if self.fast {
            self.experiment_root.join(format!("fast_{expname}"))
        } else {
            self.experiment_root.join(expname)
        }
    }
}
