//! Telemetry metric name constants.
//!
//! Centralised metric names for hermod operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! These counters run alongside the JSONL event ledger in
//! [`ledger`](crate::ledger); the ledger is the durable record, the
//! counters are for live dashboards.
//!
//! # Common labels
//!
//! - `generator`: text generator name (e.g. "gemini")
//! - `status`: outcome: "ok" or "exhausted"

/// Total generation calls started (one per controller invocation).
///
/// Labels: `generator`.
pub const REQUESTS_TOTAL: &str = "hermod_requests_total";

/// Total generation calls finished.
///
/// Labels: `generator`, `status` ("ok" | "exhausted").
pub const COMPLETIONS_TOTAL: &str = "hermod_completions_total";

/// Total failed attempts that were followed by a backoff.
///
/// Labels: `generator`.
pub const RETRIES_TOTAL: &str = "hermod_retries_total";

/// Total failed attempts classified as rate limiting or transient network failure.
///
/// Labels: `generator`.
pub const RATE_LIMITS_TOTAL: &str = "hermod_rate_limits_total";

/// Ledger writes that failed and were dropped.
pub const LEDGER_DROPS_TOTAL: &str = "hermod_ledger_drops_total";
