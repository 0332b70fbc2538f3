//! Lockstep: batched autoregressive decoding
//!
//! This crate provides the core types and traits for driving a next-token
//! predictor over a batch of prompts: the padded sequence buffer, the
//! sampling policy, and the model / tokenizer / logits boundaries.
//! Backends live in separate crates, the decode loop in `lockstep-runtime`.

#![allow(clippy::missing_panics_doc, clippy::doc_markdown)]

pub mod batch;
pub mod error;
pub mod logits;
pub mod model;
pub mod sampling;
pub mod tokenizer;

pub use batch::{max_prompt_len, min_prompt_len, total_len, TokenBatch, TokenWindow};
pub use error::{Error, Result};
pub use logits::Logits;
pub use model::{Model, ModelConfig};
pub use sampling::{GenerateOptions, SamplingParams, SamplingPolicy};
pub use tokenizer::{HfTokenizer, Tokenizer};
