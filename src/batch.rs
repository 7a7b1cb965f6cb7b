//! Bounded-concurrency batch generation with retry passes.
//!
//! A batch runs every prompt through a shared [`RetryController`] with at
//! most `workers` calls in flight. Results that fail (retries exhausted, or
//! rejected by the finishing step) are collected and re-run for up to
//! `retry_passes` further rounds. Output order always matches input order.

use futures_util::StreamExt;
use futures_util::stream;
use tracing::info;

use crate::providers::RetryController;
use crate::types::GenerationOutcome;

/// Default number of concurrent generation calls.
pub const DEFAULT_WORKERS: usize = 5;

/// Default number of extra rounds for failed entries.
pub const DEFAULT_RETRY_PASSES: u32 = 3;

/// Final state of one batch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Finished text, or the reason the last round failed.
    pub result: Result<String, String>,
    /// Rounds this entry took part in (1 = succeeded on the first run).
    pub rounds: u32,
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Finished text, if any.
    pub fn text(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }
}

/// Runs many prompts through one controller.
#[derive(Debug, Clone)]
pub struct BatchGenerator {
    controller: RetryController,
    workers: usize,
    retry_passes: u32,
}

impl BatchGenerator {
    pub fn new(controller: RetryController) -> Self {
        Self {
            controller,
            workers: DEFAULT_WORKERS,
            retry_passes: DEFAULT_RETRY_PASSES,
        }
    }

    /// Set the maximum number of calls in flight. Values below 1 mean 1.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the number of extra rounds for failed entries.
    pub fn retry_passes(mut self, passes: u32) -> Self {
        self.retry_passes = passes;
        self
    }

    /// Generate every prompt; empty completions count as failures.
    pub async fn run<P: AsRef<str>>(&self, prompts: &[P]) -> Vec<BatchEntry> {
        self.run_with(prompts, |_, text| {
            if text.is_empty() {
                Err("empty completion".to_string())
            } else {
                Ok(text.to_string())
            }
        })
        .await
    }

    /// Generate every prompt and pass each completion through `finish`.
    ///
    /// `finish` receives the prompt index and the trimmed completion and
    /// returns the final text or a rejection reason. Rejected entries are
    /// re-run like exhausted ones.
    pub async fn run_with<P, F>(&self, prompts: &[P], finish: F) -> Vec<BatchEntry>
    where
        P: AsRef<str>,
        F: Fn(usize, &str) -> Result<String, String>,
    {
        let mut entries = vec![
            BatchEntry {
                result: Err("not attempted".to_string()),
                rounds: 0,
            };
            prompts.len()
        ];
        let mut pending: Vec<usize> = (0..prompts.len()).collect();

        for round in 0..=self.retry_passes {
            if pending.is_empty() {
                break;
            }
            if round > 0 {
                info!(
                    pass = round,
                    retry_passes = self.retry_passes,
                    remaining = pending.len(),
                    "re-running failed generations"
                );
            }

            let results: Vec<(usize, GenerationOutcome)> = stream::iter(pending.iter().copied())
                .map(|index| {
                    let prompt = prompts[index].as_ref();
                    async move { (index, self.controller.generate(prompt).await) }
                })
                .buffered(self.workers)
                .collect()
                .await;

            pending.clear();
            for (index, outcome) in results {
                let result = match outcome {
                    GenerationOutcome::Success { text, .. } => finish(index, &text),
                    GenerationOutcome::Failure { reason, .. } => Err(reason.to_string()),
                };
                if result.is_err() {
                    pending.push(index);
                }
                entries[index] = BatchEntry {
                    result,
                    rounds: round + 1,
                };
            }
        }

        if !pending.is_empty() {
            info!(failed = pending.len(), total = prompts.len(), "batch finished with failures");
        }
        entries
    }
}
