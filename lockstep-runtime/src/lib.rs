//! Lockstep Runtime: text-in, text-out batched generation
//!
//! # Architecture
//!
//! ```text
//! Runtime<M, T>      ← text in, text out (owns Model + Tokenizer)
//!   ├── TokenBatch   ← padded prompts + prompt mask
//!   ├── Decoder<M>   ← one forward + sampling step per column
//!   └── assemble     ← per-row length bound and EOS cut
//! ```

mod assemble;
mod decoder;
mod runtime;

pub use assemble::{assemble, assemble_row, Completion, FinishReason};
pub use decoder::{Cursor, DecodePhase, DecodeState, Decoder};
pub use runtime::Runtime;
