//! Run events and the sinks that receive them.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, Level};

/// Something that happened to a stage or to the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunEventKind {
    /// A prerequisite failed or was never submitted.
    StageBlocked,
    /// An escalation variant nobody selected.
    StageHeld,
    /// The declared output already exists.
    StageMemoized,
    /// `run.sh` was written.
    StageRendered,
    /// The queue accepted the stage, or it ran to success locally.
    StageSubmitted,
    /// Planning, submission or the script itself failed.
    StageFailed,
    /// The walk is over.
    RunCompleted,
}

impl RunEventKind {
    /// Dotted name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StageBlocked => "stage.blocked",
            Self::StageHeld => "stage.held",
            Self::StageMemoized => "stage.memoized",
            Self::StageRendered => "stage.rendered",
            Self::StageSubmitted => "stage.submitted",
            Self::StageFailed => "stage.failed",
            Self::RunCompleted => "run.completed",
        }
    }

    /// True for events that need an operator's attention.
    #[must_use]
    pub fn is_problem(self) -> bool {
        matches!(self, Self::StageBlocked | Self::StageFailed)
    }
}

impl fmt::Display for RunEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives runner events.
///
/// The runner is synchronous, so emitting must never block for long or
/// fail: sinks log and swallow their own errors.
pub trait EventSink: Send + Sync {
    /// Emits an event with its structured payload.
    fn emit(&self, kind: RunEventKind, data: serde_json::Value);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _kind: RunEventKind, _data: serde_json::Value) {}
}

/// Forwards events to `tracing`. Problems are always logged at info.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Logs routine events at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, kind: RunEventKind, data: serde_json::Value) {
        let stage = data.get("stage").and_then(serde_json::Value::as_str).unwrap_or("-");
        if kind.is_problem() || self.level <= Level::INFO {
            info!(event = %kind, stage = %stage, data = %data, "Run event");
        } else {
            debug!(event = %kind, stage = %stage, data = %data, "Run event");
        }
    }
}

/// One event captured by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// What happened.
    pub kind: RunEventKind,
    /// Payload as emitted.
    pub data: serde_json::Value,
}

impl RecordedEvent {
    /// The `stage` field of the payload, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.data.get("stage").and_then(serde_json::Value::as_str)
    }
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.read().clone()
    }

    /// Number of events so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True before the first event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: RunEventKind) -> Vec<RecordedEvent> {
        self.events.read().iter().filter(|e| e.kind == kind).cloned().collect()
    }

    /// Stage labels that saw an event of `kind`, in order.
    #[must_use]
    pub fn stages_with(&self, kind: RunEventKind) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.stage().map(str::to_string))
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, kind: RunEventKind, data: serde_json::Value) {
        self.events.write().push(RecordedEvent { kind, data });
    }
}
