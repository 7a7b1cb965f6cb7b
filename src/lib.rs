//! Hermod - resilient text generation for promotional post pipelines
//!
//! The core of this crate is [`RetryController`]: it wraps any
//! [`TextGenerator`] with bounded retries, exponential backoff with jitter,
//! and an append-only event ledger. A call never fails outright; it ends in
//! a [`GenerationOutcome`] that is either the trimmed text or the reason
//! retries ran out.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hermod::{GeminiClient, JsonlEventSink, RetryController, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() -> hermod::Result<()> {
//!     let client = GeminiClient::new("your-google-api-key")?;
//!     let controller = RetryController::new(Arc::new(client), RetryPolicy::new().max_retries(5))
//!         .with_sink(Arc::new(JsonlEventSink::new("logs/ai_metrics.jsonl")));
//!
//!     let outcome = controller.generate("Write a short post about spring sales.").await;
//!     println!("{}", outcome.into_text());
//!     Ok(())
//! }
//! ```
//!
//! Around the controller sit the pieces a post pipeline needs:
//! [`BatchGenerator`] for bounded-concurrency runs with retry passes,
//! [`posts`] for prompt building and cleanup, [`config`] for the YAML
//! policy files, and [`ledger::MetricsSummary`] for reading the ledger back.

pub mod batch;
pub mod config;
pub mod error;
pub mod ledger;
pub mod posts;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use batch::{BatchEntry, BatchGenerator};
pub use config::{GenerationPolicy, Secrets};
pub use error::{HermodError, Result};
pub use ledger::{
    EventKind, EventSink, JsonlEventSink, MemoryEventSink, MetricsEvent, MetricsSummary,
    NoopEventSink,
};
pub use providers::{
    AttemptRecord, ErrorClass, GeminiClient, RetryController, RetryPolicy, TextGenerator,
    classify,
};
pub use types::{FailureReason, GenerateOptions, GenerateResponse, GenerationOutcome};
