//! Append-only event ledger for generation calls.
//!
//! Every controller call writes a short sequence of [`MetricsEvent`]s to an
//! [`EventSink`]. The canonical sink is [`JsonlEventSink`], which appends one
//! JSON object per line:
//!
//! ```text
//! {"timestamp":1760000000,"event":"ai_success","info":{"attempts":2}}
//! ```
//!
//! The ledger is write-only from the controller's point of view; the
//! [`summary`] module reads it back for post-run reporting.
//!
//! Recording is fallible (`record` returns a [`Result`]) but callers treat
//! the ledger as observability only: the controller logs a failed write and
//! carries on.
//!
//! A call with `N` attempts that all fail writes `N` `ai_error` events but
//! only `N - 1` `retry_attempt` events: no backoff is scheduled after the
//! last attempt, which is followed directly by `ai_final_failure`. Count
//! retries from `retry_attempt`, attempts from `ai_error` plus the final
//! `ai_success`.

pub mod summary;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

pub use summary::MetricsSummary;

/// Kind of a ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A controller call started.
    AiRequestStart,
    /// A call produced text.
    AiSuccess,
    /// An attempt failed.
    AiError,
    /// A failed attempt was classified as rate limiting.
    AiRateLimit,
    /// A call ran out of attempts.
    AiFinalFailure,
    /// A backoff was scheduled before the next attempt.
    RetryAttempt,
}

impl EventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [EventKind; 6] = [
        EventKind::AiRequestStart,
        EventKind::AiSuccess,
        EventKind::AiError,
        EventKind::AiRateLimit,
        EventKind::AiFinalFailure,
        EventKind::RetryAttempt,
    ];

    /// Wire name, as written in the `event` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AiRequestStart => "ai_request_start",
            EventKind::AiSuccess => "ai_success",
            EventKind::AiError => "ai_error",
            EventKind::AiRateLimit => "ai_rate_limit",
            EventKind::AiFinalFailure => "ai_final_failure",
            EventKind::RetryAttempt => "retry_attempt",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvent {
    /// Unix time in seconds.
    pub timestamp: i64,
    pub event: EventKind,
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl MetricsEvent {
    /// Create an event stamped with the current time and no details.
    pub fn new(event: EventKind) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            event,
            info: Map::new(),
        }
    }

    /// Attach a detail field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.info.insert(key.to_string(), value.into());
        self
    }

    /// Look up a detail field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.info.get(key)
    }
}

/// Destination for ledger events.
///
/// Implementations must tolerate concurrent callers and must write each
/// event as a unit: events from different calls may interleave, a single
/// event may not be split.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &MetricsEvent) -> Result<()>;
}

/// Appends events as JSON lines to a file.
///
/// The file and its parent directories are created on first write, and the
/// handle stays open for later events. Each event is serialized before the
/// lock is taken and written with a single `write_all`.
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the ledger file so a new run starts from an empty log.
    ///
    /// A missing file is not an error.
    pub fn reset(&self) -> Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *file = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl JsonlEventSink {
    fn open(&self) -> Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?)
    }
}

impl EventSink for JsonlEventSink {
    fn record(&self, event: &MetricsEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut guard = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // A handle that failed a write is dropped and reopened next time.
        let mut file = match guard.take() {
            Some(file) => file,
            None => self.open()?,
        };
        file.write_all(line.as_bytes())?;
        *guard = Some(file);
        Ok(())
    }
}

/// Keeps events in memory. Useful for tests and for embedding callers
/// that forward events elsewhere.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<MetricsEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in order.
    pub fn events(&self) -> Vec<MetricsEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Kinds recorded so far, in order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.event).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.event == kind).count()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: &MetricsEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: &MetricsEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_to_wire_shape() {
        let event = MetricsEvent {
            timestamp: 1_700_000_000,
            event: EventKind::AiSuccess,
            info: Map::new(),
        }
        .with("attempts", 2);

        let json: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": 1_700_000_000,
                "event": "ai_success",
                "info": {"attempts": 2}
            })
        );
    }

    #[test]
    fn kind_names_match_serde() {
        for kind in EventKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, Value::String(kind.as_str().to_string()));
        }
    }

    #[test]
    fn memory_sink_counts_by_kind() {
        let sink = MemoryEventSink::new();
        sink.record(&MetricsEvent::new(EventKind::AiError)).unwrap();
        sink.record(&MetricsEvent::new(EventKind::AiError)).unwrap();
        sink.record(&MetricsEvent::new(EventKind::AiSuccess)).unwrap();
        assert_eq!(sink.count(EventKind::AiError), 2);
        assert_eq!(sink.count(EventKind::AiSuccess), 1);
        assert_eq!(sink.count(EventKind::AiFinalFailure), 0);
    }
}
