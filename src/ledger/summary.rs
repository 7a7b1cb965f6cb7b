//! Post-run aggregation of the event ledger.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::EventKind;
use crate::Result;

/// Event counts and average attempts for one ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSummary {
    /// Number of well-formed events read.
    pub total_events: usize,
    /// Count per `event` name. Unknown names are counted too.
    pub counts: BTreeMap<String, usize>,
    /// Mean `attempts` over `ai_success` events, if there were any.
    pub average_attempts: Option<f64>,
}

impl MetricsSummary {
    /// Aggregate a ledger file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Aggregate JSON lines from any reader.
    ///
    /// Lines that are not JSON objects with a string `event` field are
    /// skipped. An `ai_success` event without an `attempts` field counts as
    /// one attempt.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut summary = Self::default();
        let mut attempts_sum = 0.0;
        let mut successes = 0usize;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(&line) else {
                debug!(line = index + 1, "skipping malformed ledger line");
                continue;
            };
            let Some(event) = value.get("event").and_then(Value::as_str) else {
                debug!(line = index + 1, "skipping ledger line without event");
                continue;
            };

            summary.total_events += 1;
            *summary.counts.entry(event.to_string()).or_default() += 1;

            if event == EventKind::AiSuccess.as_str() {
                let attempts = value
                    .get("info")
                    .and_then(|info| info.get("attempts"))
                    .and_then(Value::as_f64)
                    .unwrap_or(1.0);
                attempts_sum += attempts;
                successes += 1;
            }
        }

        if successes > 0 {
            summary.average_attempts = Some(attempts_sum / successes as f64);
        }
        Ok(summary)
    }

    /// Count for a known event kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.counts.get(kind.as_str()).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "total events: {}", self.total_events)?;
        for kind in EventKind::ALL {
            writeln!(f, "{kind}: {}", self.count(kind))?;
        }
        match self.average_attempts {
            Some(avg) => write!(f, "average attempts to success: {avg:.2}"),
            None => write!(f, "average attempts to success: n/a"),
        }
    }
}
