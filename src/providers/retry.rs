//! Retry policy, backoff calculation, and the resilient call controller.
//!
//! Provides [`RetryPolicy`] for controlling retry behaviour, the pure
//! [`classify`] and [`backoff`] helpers, and [`RetryController`], which
//! wraps a [`TextGenerator`] with bounded retries.
//!
//! Every failed attempt is retried; the error classification only decides
//! how long to wait. A call never returns an error: it ends in a
//! [`GenerationOutcome`], and every step is written to the event ledger.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::traits::TextGenerator;
use crate::ledger::{EventKind, EventSink, MetricsEvent, NoopEventSink};
use crate::types::{FailureReason, GenerateResponse, GenerationOutcome};
use crate::{HermodError, Result, telemetry};

/// Substrings (lowercase) that mark an error as throttling or a transient
/// network failure.
const RATE_LIMIT_INDICATORS: &[&str] = &[
    "resource_exhausted",
    "429",
    "rate",
    "timeout",
    "timedout",
    "conn",
    "refused",
    "reset",
];

/// Largest exponent fed to `powi`; anything above is already past any cap.
const MAX_EXPONENT: u32 = 1023;

// ============================================================================
// Policy
// ============================================================================

/// Configuration for retry behaviour.
///
/// All durations are in seconds. Uses exponential backoff with jitter:
///
/// ```rust
/// # use hermod::RetryPolicy;
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .base(1.0)
///     .jitter_max(0.5);
/// assert!(policy.validate().is_ok());
/// ```
///
/// When deserialized, `max_retries` is required. `base`, `max_backoff` and
/// `jitter_max` also accept the `retry_base_backoff`, `retry_max_backoff`
/// and `retry_jitter_max` key names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of remote calls per request (including the first).
    pub max_retries: u32,
    /// Backoff before the second attempt. Default: 2s.
    #[serde(default = "default_base", alias = "retry_base_backoff")]
    pub base: f64,
    /// Ceiling for any single wait, jitter included. Default: 120s.
    #[serde(default = "default_max_backoff", alias = "retry_max_backoff")]
    pub max_backoff: f64,
    /// Factor applied to the backoff of rate-limited errors. Default: 6.
    #[serde(default = "default_rate_limit_multiplier")]
    pub rate_limit_multiplier: f64,
    /// Upper bound of the uniform jitter added to each wait. Default: 2s.
    #[serde(default = "default_jitter_max", alias = "retry_jitter_max")]
    pub jitter_max: f64,
}

fn default_base() -> f64 {
    2.0
}

fn default_max_backoff() -> f64 {
    120.0
}

fn default_rate_limit_multiplier() -> f64 {
    6.0
}

fn default_jitter_max() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: default_base(),
            max_backoff: default_max_backoff(),
            rate_limit_multiplier: default_rate_limit_multiplier(),
            jitter_max: default_jitter_max(),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the base backoff in seconds.
    pub fn base(mut self, seconds: f64) -> Self {
        self.base = seconds;
        self
    }

    /// Set the backoff ceiling in seconds.
    pub fn max_backoff(mut self, seconds: f64) -> Self {
        self.max_backoff = seconds;
        self
    }

    /// Set the rate-limit multiplier.
    pub fn rate_limit_multiplier(mut self, factor: f64) -> Self {
        self.rate_limit_multiplier = factor;
        self
    }

    /// Set the jitter bound in seconds. Zero disables jitter.
    pub fn jitter_max(mut self, seconds: f64) -> Self {
        self.jitter_max = seconds;
        self
    }

    /// Reject policies the controller cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(HermodError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        let fields = [
            ("base", self.base),
            ("max_backoff", self.max_backoff),
            ("rate_limit_multiplier", self.rate_limit_multiplier),
            ("jitter_max", self.jitter_max),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(HermodError::Configuration(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.max_backoff < self.base {
            return Err(HermodError::Configuration(format!(
                "max_backoff ({}) must not be below base ({})",
                self.max_backoff, self.base
            )));
        }
        Ok(())
    }

    /// Compute the wait before the attempt following `attempt` (1-based).
    pub fn delay_for_attempt(
        &self,
        attempt: u32,
        class: ErrorClass,
        rng: &mut impl Rng,
    ) -> BackoffDelay {
        let backoff = capped_backoff(
            attempt,
            class.is_rate_limited(),
            self.base,
            self.max_backoff,
            self.rate_limit_multiplier,
        );
        let jitter = if self.jitter_max > 0.0 && self.jitter_max.is_finite() {
            rng.random_range(0.0..=self.jitter_max)
        } else {
            0.0
        };
        BackoffDelay {
            backoff,
            jitter,
            sleep: (backoff + jitter).min(self.max_backoff),
        }
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttling or a transient network failure; backs off harder.
    RateLimited,
    Other,
}

impl ErrorClass {
    pub fn is_rate_limited(self) -> bool {
        self == ErrorClass::RateLimited
    }
}

/// Classify an error by its description.
///
/// Case-insensitive substring match against a fixed indicator list
/// (resource exhaustion, HTTP 429, "rate", timeouts, refused or reset
/// connections). Empty text is [`ErrorClass::Other`].
pub fn classify(error_text: &str) -> ErrorClass {
    let text = error_text.to_lowercase();
    if RATE_LIMIT_INDICATORS.iter().any(|ind| text.contains(ind)) {
        ErrorClass::RateLimited
    } else {
        ErrorClass::Other
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// A computed wait, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffDelay {
    /// Exponential part, after the multiplier and the cap.
    pub backoff: f64,
    /// Random part added on top.
    pub jitter: f64,
    /// What is actually slept: `min(backoff + jitter, max_backoff)`.
    pub sleep: f64,
}

impl BackoffDelay {
    pub fn sleep_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.sleep).unwrap_or(Duration::ZERO)
    }
}

/// Deterministic part of the backoff: `base * 2^(attempt-1)`, times
/// `rate_limit_multiplier` when rate limited, capped at `max_backoff`.
///
/// Non-decreasing in `attempt`. `attempt = 0` is treated as 1.
pub fn capped_backoff(
    attempt: u32,
    rate_limited: bool,
    base: f64,
    max_backoff: f64,
    rate_limit_multiplier: f64,
) -> f64 {
    let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
    let mut raw = base * 2f64.powi(exponent as i32);
    if rate_limited {
        raw *= rate_limit_multiplier;
    }
    raw.min(max_backoff)
}

/// Full backoff in seconds: [`capped_backoff`] plus uniform jitter in
/// `[0, jitter_max]`, capped again at `max_backoff`.
pub fn backoff(
    attempt: u32,
    rate_limited: bool,
    base: f64,
    max_backoff: f64,
    rate_limit_multiplier: f64,
    jitter_max: f64,
) -> f64 {
    let capped = capped_backoff(attempt, rate_limited, base, max_backoff, rate_limit_multiplier);
    let jitter = if jitter_max > 0.0 && jitter_max.is_finite() {
        rand::rng().random_range(0.0..=jitter_max)
    } else {
        0.0
    };
    (capped + jitter).min(max_backoff)
}

// ============================================================================
// Retry loop
// ============================================================================

/// One attempt of a call, kept only while the call runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-based attempt index.
    pub attempt: u32,
    /// Time slept before this attempt.
    pub waited: Duration,
    /// Error description, if the attempt failed.
    pub error: Option<String>,
    pub succeeded: bool,
}

/// Run `call` under `policy` and return the outcome.
///
/// See [`generate_with_retry_traced`] for the attempt trace.
pub async fn generate_with_retry<F, Fut>(
    policy: &RetryPolicy,
    sink: &dyn EventSink,
    generator: &str,
    call: F,
) -> GenerationOutcome
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<GenerateResponse>>,
{
    generate_with_retry_traced(policy, sink, generator, call)
        .await
        .0
}

/// Run `call` under `policy`, returning the outcome and one record per
/// attempt.
///
/// The call runs at most `max(policy.max_retries, 1)` times. On success the
/// response text is trimmed of leading and trailing whitespace and
/// returned, even if that leaves it empty. On failure the error is
/// classified, logged, and a backoff is slept before the next attempt;
/// there is no sleep after the last one.
pub async fn generate_with_retry_traced<F, Fut>(
    policy: &RetryPolicy,
    sink: &dyn EventSink,
    generator: &str,
    call: F,
) -> (GenerationOutcome, Vec<AttemptRecord>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<GenerateResponse>>,
{
    let max_retries = policy.max_retries.max(1);
    let mut records = Vec::new();
    let mut waited = Duration::ZERO;
    let mut last_error = String::new();

    metrics::counter!(telemetry::REQUESTS_TOTAL, "generator" => generator.to_owned())
        .increment(1);
    emit(
        sink,
        MetricsEvent::new(EventKind::AiRequestStart)
            .with("generator", generator)
            .with("max_retries", max_retries),
    );

    for attempt in 1..=max_retries {
        match call().await {
            Ok(response) => {
                let text = response.text().trim().to_string();
                records.push(AttemptRecord {
                    attempt,
                    waited,
                    error: None,
                    succeeded: true,
                });
                metrics::counter!(telemetry::COMPLETIONS_TOTAL,
                    "generator" => generator.to_owned(),
                    "status" => "ok",
                )
                .increment(1);
                debug!(generator, attempts = attempt, chars = text.chars().count(), "generation succeeded");
                emit(
                    sink,
                    MetricsEvent::new(EventKind::AiSuccess)
                        .with("attempts", attempt)
                        .with("generator", generator),
                );
                return (
                    GenerationOutcome::Success {
                        text,
                        attempts: attempt,
                    },
                    records,
                );
            }
            Err(e) => {
                let error_text = e.to_string();
                let class = classify(&error_text);
                records.push(AttemptRecord {
                    attempt,
                    waited,
                    error: Some(error_text.clone()),
                    succeeded: false,
                });

                emit(
                    sink,
                    MetricsEvent::new(EventKind::AiError)
                        .with("attempt", attempt)
                        .with("max_retries", max_retries)
                        .with("error", error_text.as_str())
                        .with("is_rate_limit", class.is_rate_limited()),
                );
                if class.is_rate_limited() {
                    metrics::counter!(telemetry::RATE_LIMITS_TOTAL, "generator" => generator.to_owned())
                        .increment(1);
                    emit(
                        sink,
                        MetricsEvent::new(EventKind::AiRateLimit)
                            .with("attempt", attempt)
                            .with("error", error_text.as_str()),
                    );
                }

                if attempt < max_retries {
                    let delay = policy.delay_for_attempt(attempt, class, &mut rand::rng());
                    metrics::counter!(telemetry::RETRIES_TOTAL, "generator" => generator.to_owned())
                        .increment(1);
                    warn!(
                        generator,
                        attempt,
                        max_retries,
                        rate_limited = class.is_rate_limited(),
                        delay_ms = (delay.sleep * 1000.0) as u64,
                        error = %e,
                        "retrying after failed generation"
                    );
                    emit(
                        sink,
                        MetricsEvent::new(EventKind::RetryAttempt)
                            .with("attempt", attempt)
                            .with("max_retries", max_retries)
                            .with("error", error_text.as_str())
                            .with("is_rate_limit", class.is_rate_limited())
                            .with("backoff", delay.backoff)
                            .with("jitter", delay.jitter)
                            .with("sleep_time", delay.sleep),
                    );

                    let started = Instant::now();
                    tokio::time::sleep(delay.sleep_duration()).await;
                    waited = started.elapsed();
                }
                last_error = error_text;
            }
        }
    }

    metrics::counter!(telemetry::COMPLETIONS_TOTAL,
        "generator" => generator.to_owned(),
        "status" => "exhausted",
    )
    .increment(1);
    warn!(generator, attempts = max_retries, error = %last_error, "generation failed, retries exhausted");
    emit(
        sink,
        MetricsEvent::new(EventKind::AiFinalFailure)
            .with("attempts", max_retries)
            .with("error", last_error.as_str()),
    );
    (
        GenerationOutcome::Failure {
            reason: FailureReason::Exhausted { last_error },
            attempts: max_retries,
        },
        records,
    )
}

/// Record an event; a failed write is logged and dropped.
fn emit(sink: &dyn EventSink, event: MetricsEvent) {
    if let Err(e) = sink.record(&event) {
        metrics::counter!(telemetry::LEDGER_DROPS_TOTAL).increment(1);
        debug!(event = %event.event, error = %e, "dropping ledger event");
    }
}

// ============================================================================
// RetryController
// ============================================================================

/// Wraps a [`TextGenerator`] with bounded retries and event logging.
///
/// The generator, policy and sink are all passed in; the controller holds
/// no other state, so one instance can serve many concurrent calls.
#[derive(Clone)]
pub struct RetryController {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
}

impl RetryController {
    /// Wrap a generator. Events are discarded until a sink is attached
    /// with [`with_sink`](Self::with_sink).
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self {
            generator,
            policy,
            sink: Arc::new(NoopEventSink),
        }
    }

    /// Record events to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Generate text for `prompt`, retrying failed attempts.
    pub async fn generate(&self, prompt: &str) -> GenerationOutcome {
        generate_with_retry(
            &self.policy,
            self.sink.as_ref(),
            self.generator.name(),
            || self.generator.generate(prompt),
        )
        .await
    }

    /// Like [`generate`](Self::generate), also returning the attempt trace.
    pub async fn generate_traced(&self, prompt: &str) -> (GenerationOutcome, Vec<AttemptRecord>) {
        generate_with_retry_traced(
            &self.policy,
            self.sink.as_ref(),
            self.generator.name(),
            || self.generator.generate(prompt),
        )
        .await
    }
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("generator", &self.generator.name())
            .field("policy", &self.policy)
            .finish()
    }
}
