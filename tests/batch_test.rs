use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hermod::{
    BatchGenerator, GenerateResponse, HermodError, Result, RetryController, RetryPolicy,
    TextGenerator,
};

/// Echoes the prompt after a short delay, tracking peak concurrency.
#[derive(Default)]
struct SlowEcho {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl TextGenerator for SlowEcho {
    fn name(&self) -> &str {
        "slow-echo"
    }

    async fn generate(&self, prompt: &str) -> Result<GenerateResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        // Later prompts finish first to shake out ordering bugs.
        let delay = 50u64.saturating_sub(prompt.len() as u64 * 5);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(GenerateResponse::from_text(prompt))
    }
}

/// Fails the first `n` calls for each prompt.
struct FlakyPerPrompt {
    failures: u32,
    seen: Mutex<HashMap<String, u32>>,
}

impl FlakyPerPrompt {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            seen: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TextGenerator for FlakyPerPrompt {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn generate(&self, prompt: &str) -> Result<GenerateResponse> {
        let calls = {
            let mut seen = self.seen.lock().unwrap();
            let calls = seen.entry(prompt.to_string()).or_default();
            *calls += 1;
            *calls
        };
        if calls <= self.failures {
            return Err(HermodError::Api {
                status: 500,
                message: "flaky".into(),
            });
        }
        Ok(GenerateResponse::from_text(format!("done:{prompt}")))
    }
}

fn single_attempt() -> RetryPolicy {
    RetryPolicy::new().max_retries(1).jitter_max(0.0)
}

#[tokio::test(start_paused = true)]
async fn output_order_matches_input() {
    let generator = Arc::new(SlowEcho::default());
    let prompts: Vec<String> = (0..10).map(|i| "p".repeat(i + 1)).collect();

    let batch = BatchGenerator::new(RetryController::new(generator, single_attempt())).workers(3);
    let entries = batch.run(&prompts).await;

    let texts: Vec<&str> = entries.iter().map(|e| e.text().unwrap()).collect();
    let expected: Vec<&str> = prompts.iter().map(String::as_str).collect();
    assert_eq!(texts, expected);
    assert!(entries.iter().all(|e| e.rounds == 1));
}

#[tokio::test(start_paused = true)]
async fn in_flight_calls_never_exceed_workers() {
    let generator = Arc::new(SlowEcho::default());
    let prompts: Vec<String> = (0..20).map(|i| format!("prompt {i}")).collect();

    let batch = BatchGenerator::new(RetryController::new(generator.clone(), single_attempt()))
        .workers(4);
    batch.run(&prompts).await;

    let peak = generator.peak.load(Ordering::SeqCst);
    assert!(peak <= 4, "peak concurrency {peak} exceeded workers");
    assert!(peak >= 2, "batch did not run concurrently");
}

#[tokio::test(start_paused = true)]
async fn failed_entries_are_rerun_in_later_passes() {
    // One attempt per call, two failures per prompt: succeeds in round 3.
    let generator = Arc::new(FlakyPerPrompt::new(2));
    let batch = BatchGenerator::new(RetryController::new(generator, single_attempt()))
        .retry_passes(3);

    let entries = batch.run(&["a", "b"]).await;

    assert_eq!(entries[0].text(), Some("done:a"));
    assert_eq!(entries[1].text(), Some("done:b"));
    assert!(entries.iter().all(|e| e.rounds == 3));
}

#[tokio::test(start_paused = true)]
async fn entries_fail_after_passes_run_out() {
    let generator = Arc::new(FlakyPerPrompt::new(10));
    let batch = BatchGenerator::new(RetryController::new(generator, single_attempt()))
        .retry_passes(1);

    let entries = batch.run(&["a"]).await;

    assert!(!entries[0].is_ok());
    assert_eq!(entries[0].rounds, 2);
    assert!(entries[0].result.as_ref().unwrap_err().contains("flaky"));
}

#[tokio::test(start_paused = true)]
async fn finish_step_can_reject_completions() {
    let generator = Arc::new(FlakyPerPrompt::new(0));
    let batch = BatchGenerator::new(RetryController::new(generator, single_attempt()))
        .retry_passes(2);

    let entries = batch
        .run_with(&["x"], |index, text| {
            assert_eq!(index, 0);
            Err(format!("rejected {text}"))
        })
        .await;

    assert_eq!(entries[0].result, Err("rejected done:x".to_string()));
    assert_eq!(entries[0].rounds, 3);
}

#[tokio::test]
async fn empty_batch_is_empty() {
    let batch = BatchGenerator::new(RetryController::new(
        Arc::new(SlowEcho::default()),
        single_attempt(),
    ));
    let prompts: [&str; 0] = [];
    assert!(batch.run(&prompts).await.is_empty());
}
