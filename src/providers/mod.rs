//! Text generators and the retry controller that wraps them.
//!
//! - [`traits`]: the [`TextGenerator`] seam
//! - [`retry`]: policy, classifier, backoff and [`RetryController`]
//! - [`gemini`]: HTTP client for Google's generative-language API

pub mod gemini;
pub mod retry;
pub mod traits;

pub use gemini::GeminiClient;
pub use retry::{
    AttemptRecord, BackoffDelay, ErrorClass, RetryController, RetryPolicy, backoff,
    capped_backoff, classify, generate_with_retry, generate_with_retry_traced,
};
pub use traits::TextGenerator;
