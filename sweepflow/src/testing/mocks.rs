//! Recording submission backend.

use parking_lot::Mutex;
use std::collections::HashSet;

use crate::errors::SubmissionError;
use crate::runner::{QueueSubmitter, SubmitOutcome, SubmitRequest};

/// A submitter that records every request and hands out sequential job
/// ids, failing the job names it was told to fail.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    requests: Mutex<Vec<SubmitRequest>>,
    failing: HashSet<String>,
    synchronous: bool,
}

impl RecordingSubmitter {
    /// Creates a submitter that queues everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects submissions of the given job name.
    #[must_use]
    pub fn failing_on(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Reports jobs as completed instead of queued.
    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    /// Returns every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<SubmitRequest> {
        self.requests.lock().clone()
    }

    /// Returns the job names received, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.name.clone()).collect()
    }

    /// Returns the request for a job name.
    #[must_use]
    pub fn request(&self, name: &str) -> Option<SubmitRequest> {
        self.requests.lock().iter().find(|r| r.name == name).cloned()
    }
}

impl QueueSubmitter for RecordingSubmitter {
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome, SubmissionError> {
        let mut requests = self.requests.lock();
        requests.push(request.clone());
        if self.failing.contains(&request.name) {
            return Err(SubmissionError::Rejected {
                command: "qsub".to_string(),
                status: 1,
                stderr: format!("job {} rejected", request.name),
            });
        }
        if self.synchronous {
            return Ok(SubmitOutcome::Completed { success: true });
        }
        Ok(SubmitOutcome::Queued((100 + requests.len()).to_string()))
    }
}
