use thiserror::Error;

use crate::types::ListKey;

/// Failures the dashboard can observe. None of these are allowed to escape as a
/// crash: callers turn them into a status line or a logged discard.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("backend runtime not callable after {waited_ms}ms")]
    ReadinessTimeout { waited_ms: u64 },

    #[error("{op} failed: {message}")]
    BackendCall { op: &'static str, message: String },

    #[error("malformed {topic} event: {reason}")]
    MalformedEvent { topic: String, reason: String },

    #[error("no {list} row at index {index}")]
    StaleDetailAccess { list: ListKey, index: String },

    #[error("event for generation {event_generation} ignored (current {current})")]
    StaleCompletion { event_generation: u64, current: u64 },
}

impl DashError {
    pub fn backend(op: &'static str, err: &anyhow::Error) -> Self {
        DashError::BackendCall {
            op,
            message: format!("{err:#}"),
        }
    }
}
