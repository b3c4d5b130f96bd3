//! Push-channel events: raw wire payloads, their canonical form, and the
//! subscriber that turns one into the other and dispatches to handlers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::DashError;

pub const DEFAULT_ERROR_MESSAGE: &str = "Scan failed";
const UNKNOWN: &str = "unknown";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    #[serde(rename = "scanProgress")]
    ScanProgress,
    #[serde(rename = "scanComplete")]
    ScanComplete,
    #[serde(rename = "scanError")]
    ScanError,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::ScanProgress => "scanProgress",
            Topic::ScanComplete => "scanComplete",
            Topic::ScanError => "scanError",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "scanProgress" => Some(Topic::ScanProgress),
            "scanComplete" => Some(Topic::ScanComplete),
            "scanError" => Some(Topic::ScanError),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event exactly as it came off the push channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub topic: String,
    pub payload: Value,
}

impl RawEvent {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub host: String,
    pub port: u16,
    pub current: u64,
    pub total: u64,
}

/// Completion is a signal: the view is re-fetched, never taken from here.
///
/// `generation` is only present when the backend echoes a correlation id; the
/// current event model has none, so it is usually `None`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub error_count: u64,
    pub generation: Option<u64>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
    pub generation: Option<u64>,
}

/// Canonical event model. Schema variance on the wire stops here.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress(ProgressEvent),
    Complete(CompletionEvent),
    Error(ErrorEvent),
}

impl ScanEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ScanEvent::Progress(_) => Topic::ScanProgress,
            ScanEvent::Complete(_) => Topic::ScanComplete,
            ScanEvent::Error(_) => Topic::ScanError,
        }
    }
}

/// Normalize one raw payload. Never panics; anything unusable comes back as
/// `MalformedEvent` for the caller to log and drop.
pub fn normalize(raw: &RawEvent) -> Result<ScanEvent, DashError> {
    let topic = Topic::parse(&raw.topic).ok_or_else(|| DashError::MalformedEvent {
        topic: raw.topic.clone(),
        reason: "unknown topic".into(),
    })?;

    match topic {
        Topic::ScanProgress => {
            let obj = as_object(topic, &raw.payload)?;
            Ok(ScanEvent::Progress(ProgressEvent {
                host: string_field(obj, "Host", "host").unwrap_or_else(|| UNKNOWN.to_string()),
                port: number_field(obj, "Port", "port")
                    .map(|p| p.min(u16::MAX as u64) as u16)
                    .unwrap_or(0),
                current: number_field(obj, "Current", "current").unwrap_or(0),
                total: number_field(obj, "Total", "total").unwrap_or(0),
            }))
        }
        Topic::ScanComplete => {
            let obj = as_object(topic, &raw.payload)?;
            let error_count = match number_field(obj, "ErrorCount", "errorCount") {
                Some(n) => n,
                None => {
                    warn!(topic = %topic, "completion without errorCount, assuming 0");
                    0
                }
            };
            Ok(ScanEvent::Complete(CompletionEvent {
                error_count,
                generation: number_field(obj, "Generation", "generation"),
            }))
        }
        Topic::ScanError => {
            // A bare or empty error still ends the scan.
            let obj = raw.payload.as_object();
            let message = obj
                .and_then(|o| string_field(o, "Message", "message"))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
            Ok(ScanEvent::Error(ErrorEvent {
                message,
                generation: obj.and_then(|o| number_field(o, "Generation", "generation")),
            }))
        }
    }
}

fn as_object<'a>(topic: Topic, payload: &'a Value) -> Result<&'a Map<String, Value>, DashError> {
    payload.as_object().ok_or_else(|| DashError::MalformedEvent {
        topic: topic.to_string(),
        reason: format!("expected an object payload, got {}", kind(payload)),
    })
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn field<'a>(obj: &'a Map<String, Value>, upper: &str, lower: &str) -> Option<&'a Value> {
    obj.get(upper)
        .filter(|v| !v.is_null())
        .or_else(|| obj.get(lower).filter(|v| !v.is_null()))
}

fn string_field(obj: &Map<String, Value>, upper: &str, lower: &str) -> Option<String> {
    match field(obj, upper, lower)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-negative integer; floats are truncated, negatives clamp to zero and
/// numeric strings are accepted.
fn number_field(obj: &Map<String, Value>, upper: &str, lower: &str) -> Option<u64> {
    match field(obj, upper, lower)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_i64().map(|i| i.max(0) as u64))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub type EventHandler = Arc<dyn Fn(ScanEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Attaches handlers to topics and feeds them normalized events in arrival
/// order. Each handler finishes before the next event is looked at.
#[derive(Default)]
pub struct EventSubscriber {
    handlers: HashMap<Topic, Vec<EventHandler>>,
}

impl EventSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F, Fut>(&mut self, topic: Topic, handler: F)
    where
        F: Fn(ScanEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler =
            Arc::new(move |ev| Box::pin(handler(ev)) as BoxFuture<'static, ()>);
        self.handlers.entry(topic).or_default().push(handler);
    }

    pub fn has_handlers(&self, topic: Topic) -> bool {
        self.handlers.get(&topic).is_some_and(|h| !h.is_empty())
    }

    /// Normalize and dispatch a single raw event. Returns false if it was dropped.
    pub async fn dispatch(&self, raw: RawEvent) -> bool {
        let event = match normalize(&raw) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(topic = %raw.topic, error = %e, "dropping malformed event");
                return false;
            }
        };
        let topic = event.topic();
        let Some(handlers) = self.handlers.get(&topic) else {
            trace!(topic = %topic, "no handler registered");
            return false;
        };
        for handler in handlers {
            handler(event.clone()).await;
        }
        true
    }

    /// Drain the channel until it closes or `cancel` fires.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<RawEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("event pump cancelled");
                    break;
                }
                next = rx.recv() => match next {
                    Some(raw) => {
                        self.dispatch(raw).await;
                    }
                    None => {
                        debug!("event channel closed");
                        break;
                    }
                },
            }
        }
    }
}
