//! Public types for the Hermod API.

mod generate;
mod outcome;

pub use generate::{Candidate, Content, GenerateOptions, GenerateResponse, Part};
pub use outcome::{FailureReason, GenerationOutcome};
