//! Generator trait consumed by the retry controller.
//!
//! The controller never talks to a network client directly; it calls a
//! [`TextGenerator`]. Production code passes a
//! [`GeminiClient`](super::GeminiClient), tests pass fakes that fail on
//! demand.
//!
//! # Example
//!
//! ```ignore
//! struct Canned;
//!
//! #[async_trait]
//! impl TextGenerator for Canned {
//!     fn name(&self) -> &str {
//!         "canned"
//!     }
//!
//!     async fn generate(&self, _prompt: &str) -> Result<GenerateResponse> {
//!         Ok(GenerateResponse::from_text("hello"))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::GenerateResponse;

/// Remote text generation capability.
///
/// Any error returned here is treated as retryable by the controller; its
/// `Display` text is what the error classifier inspects.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generator name for logging and metrics labels.
    fn name(&self) -> &str;

    /// Generate text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<GenerateResponse>;
}
