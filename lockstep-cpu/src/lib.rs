//! CPU backend for Lockstep.
//!
//! Logits live in host memory and sampling is scalar. [`BigramModel`] is a
//! small table-driven predictor, useful for tests and for exercising the
//! decoder without a neural network.

#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod bigram;
pub mod logits;

pub use bigram::{BigramCache, BigramModel};
pub use logits::CpuLogits;
