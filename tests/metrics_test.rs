//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use hermod::telemetry;
use hermod::{
    EventSink, GenerateResponse, HermodError, MetricsEvent, Result, RetryController, RetryPolicy,
    TextGenerator,
};

// ============================================================================
// Mock generators
// ============================================================================

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<GenerateResponse> {
        Ok(GenerateResponse::from_text(prompt))
    }
}

struct ThrottledGenerator;

#[async_trait]
impl TextGenerator for ThrottledGenerator {
    fn name(&self) -> &str {
        "throttled"
    }

    async fn generate(&self, _prompt: &str) -> Result<GenerateResponse> {
        Err(HermodError::RateLimited { retry_after: None })
    }
}

struct BrokenSink;

impl EventSink for BrokenSink {
    fn record(&self, _event: &MetricsEvent) -> Result<()> {
        Err(HermodError::Io(std::io::Error::other("sink closed")))
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    counter_with_label(snapshot, name, None)
}

/// Sum counter values for `name`, optionally filtered by one label pair.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| match label {
            Some((k, v)) => key.key().labels().any(|l| l.key() == k && l.value() == v),
            None => true,
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Policy with no jitter and no real waiting.
fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new()
        .max_retries(max_retries)
        .base(0.0)
        .jitter_max(0.0)
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_call_records_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let outcome = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                RetryController::new(Arc::new(EchoGenerator), fast_policy(3))
                    .generate("hello")
                    .await
            })
        })
    });
    assert!(outcome.is_success());

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::COMPLETIONS_TOTAL, Some(("status", "ok"))),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn exhausted_call_records_retries_and_rate_limits() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let outcome = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                RetryController::new(Arc::new(ThrottledGenerator), fast_policy(3))
                    .generate("hello")
                    .await
            })
        })
    });
    assert!(!outcome.is_success());

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::RATE_LIMITS_TOTAL), 3);
    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL), 2);
    assert_eq!(
        counter_with_label(
            &snapshot,
            telemetry::COMPLETIONS_TOTAL,
            Some(("status", "exhausted"))
        ),
        1
    );
    assert_eq!(
        counter_with_label(
            &snapshot,
            telemetry::REQUESTS_TOTAL,
            Some(("generator", "throttled"))
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn dropped_ledger_writes_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let outcome = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                RetryController::new(Arc::new(EchoGenerator), fast_policy(3))
                    .with_sink(Arc::new(BrokenSink))
                    .generate("hello")
                    .await
            })
        })
    });
    assert!(outcome.is_success());

    let snapshot = snapshotter.snapshot().into_vec();

    // ai_request_start and ai_success
    assert_eq!(counter_total(&snapshot, telemetry::LEDGER_DROPS_TOTAL), 2);
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let outcome = RetryController::new(Arc::new(EchoGenerator), fast_policy(1))
        .generate("hello")
        .await;
    assert_eq!(outcome.into_text(), "hello");
}
