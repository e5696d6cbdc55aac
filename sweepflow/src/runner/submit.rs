//! Queue submission backends.

use regex::Regex;
use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;

use tracing::{debug, warn};

use crate::errors::SubmissionError;
use crate::resources::ResourcePlan;

static JOB_ID: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"Your job(?:-array)? (\d+)"));

/// Everything a backend needs to submit one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Job name.
    pub name: String,
    /// Stage directory, used as the working directory.
    pub dir: PathBuf,
    /// Rendered script.
    pub script: PathBuf,
    /// Requested resources.
    pub plan: ResourcePlan,
    /// Job ids that must finish first.
    pub holds: Vec<String>,
}

/// What happened to a submitted stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The queue accepted the job.
    Queued(String),
    /// The job ran to completion before returning.
    Completed {
        /// Whether it exited successfully.
        success: bool,
    },
}

/// Hands stages to whatever executes them.
#[cfg_attr(test, mockall::automock)]
pub trait QueueSubmitter: Send + Sync {
    /// Submits one stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the job could not be handed over.
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, SubmissionError>;
}

/// Submits to a Sun Grid Engine queue through `qsub`.
#[derive(Debug, Clone)]
pub struct SgeSubmitter {
    command: String,
}

impl Default for SgeSubmitter {
    fn default() -> Self {
        Self::new("qsub")
    }
}

impl SgeSubmitter {
    /// Creates a submitter invoking `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Builds the submission arguments.
    #[must_use]
    pub fn qsub_args(&self, request: &SubmitRequest) -> Vec<String> {
        let plan = &request.plan;
        let mut args = vec!["-cwd".to_string(), "-N".to_string(), request.name.clone()];
        if let Some(queue) = &plan.queue {
            args.push("-q".to_string());
            args.push(queue.clone());
        }
        args.push("-l".to_string());
        args.push(format!("mem_free={}M,h_rt={}", plan.work_mem_megs, plan.runtime()));
        args.push("-pe".to_string());
        args.push("smp".to_string());
        args.push(plan.threads.to_string());
        if !request.holds.is_empty() {
            args.push("-hold_jid".to_string());
            args.push(request.holds.join(","));
        }
        args.push(request.script.display().to_string());
        args
    }
}

/// Extracts the job id from a `qsub` reply.
///
/// # Errors
///
/// Returns an error if the reply names no job.
pub fn parse_job_id(reply: &str) -> Result<String, SubmissionError> {
    let re = JOB_ID
        .as_ref()
        .map_err(|e| SubmissionError::UnparsedReply(e.to_string()))?;
    re.captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SubmissionError::UnparsedReply(reply.trim().to_string()))
}

impl QueueSubmitter for SgeSubmitter {
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, SubmissionError> {
        let args = self.qsub_args(request);
        debug!(command = %self.command, args = ?args, "Submitting to queue");

        let output = Command::new(&self.command)
            .args(&args)
            .current_dir(&request.dir)
            .output()
            .map_err(|e| SubmissionError::Launch {
                command: self.command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SubmissionError::Rejected {
                command: self.command.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let reply = String::from_utf8_lossy(&output.stdout);
        parse_job_id(&reply).map(SubmitOutcome::Queued)
    }
}

/// Runs each script to completion on this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalSubmitter;

impl QueueSubmitter for LocalSubmitter {
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, SubmissionError> {
        debug!(script = %request.script.display(), "Running stage locally");
        let status = Command::new("bash")
            .arg(&request.script)
            .current_dir(&request.dir)
            .status()
            .map_err(|e| SubmissionError::Launch {
                command: "bash".to_string(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            warn!(script = %request.script.display(), code = ?status.code(), "Local stage failed");
        }
        Ok(SubmitOutcome::Completed {
            success: status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(holds: Vec<String>) -> SubmitRequest {
        SubmitRequest {
            name: "model_o2".to_string(),
            dir: PathBuf::from("/exp/dp/model_o2"),
            script: PathBuf::from("/exp/dp/model_o2/run.sh"),
            plan: ResourcePlan {
                work_mem_megs: 3328,
                threads: 2,
                minutes: 130,
                queue: Some("all.q".to_string()),
            },
            holds,
        }
    }

    #[test]
    fn test_qsub_args() {
        let args = SgeSubmitter::default().qsub_args(&request(vec!["11".to_string(), "12".to_string()]));
        assert_eq!(
            args,
            vec![
                "-cwd", "-N", "model_o2", "-q", "all.q", "-l", "mem_free=3328M,h_rt=02:10:00", "-pe", "smp", "2",
                "-hold_jid", "11,12", "/exp/dp/model_o2/run.sh",
            ]
        );
    }

    #[test]
    fn test_no_holds_no_hold_flag() {
        let args = SgeSubmitter::default().qsub_args(&request(Vec::new()));
        assert!(!args.contains(&"-hold_jid".to_string()));
    }

    #[test]
    fn test_parse_job_id() {
        assert_eq!(
            parse_job_id("Your job 4242 (\"model_o2\") has been submitted\n").unwrap(),
            "4242"
        );
        assert_eq!(parse_job_id("Your job-array 77.1-3:1 (\"x\") has been submitted").unwrap(), "77");
        assert!(matches!(parse_job_id("denied"), Err(SubmissionError::UnparsedReply(_))));
    }

    #[test]
    fn test_local_submitter_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, "touch ran\n").unwrap();
        let mut req = request(Vec::new());
        req.dir = dir.path().to_path_buf();
        req.script = script;

        let outcome = LocalSubmitter.submit(&req).unwrap();
        assert_eq!(outcome, SubmitOutcome::Completed { success: true });
        assert!(dir.path().join("ran").exists());
    }

    #[test]
    fn test_missing_qsub_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(Vec::new());
        req.dir = dir.path().to_path_buf();
        let err = SgeSubmitter::new("definitely-not-a-qsub-binary").submit(&req).unwrap_err();
        assert!(matches!(err, SubmissionError::Launch { .. }));
    }
}
