//! Error types for Lockstep

use thiserror::Error;

/// Result type alias using Lockstep's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Lockstep operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Batch too large: {got} prompts, model accepts at most {max}")]
    BatchTooLarge { got: usize, max: usize },

    #[error("Empty batch: at least one prompt is required")]
    EmptyBatch,

    #[error("Prompt {0} encoded to zero tokens")]
    EmptyPrompt(usize),

    #[error("Prompt {index} has {len} tokens, buffer holds at most {max}")]
    PromptTooLong { index: usize, len: usize, max: usize },

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Invalid generation options: {0}")]
    InvalidOptions(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("{0}")]
    Other(String),
}
