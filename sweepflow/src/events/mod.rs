//! Event emission for runner observability.

mod sink;

pub use sink::{
    CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent, RunEventKind,
};
