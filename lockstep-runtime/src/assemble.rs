//! Post-loop output assembly.
//!
//! The buffer is uniform width, but each row may only grow by
//! `max_gen_len` past its own prompt, and is cut at its first EOS.

use lockstep::TokenBatch;

/// Why a row's output ended where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The row contained the end-of-sequence token.
    Stop,
    /// The row ran to its length bound.
    Length,
}

/// One finished row: prompt tokens followed by generated tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Prompt plus completion, EOS excluded.
    pub tokens: Vec<u32>,
    /// Number of leading tokens that came from the prompt.
    pub prompt_len: usize,
    pub finish_reason: FinishReason,
}

impl Completion {
    /// Tokens after the prompt.
    #[must_use]
    pub fn generated(&self) -> &[u32] {
        &self.tokens[self.prompt_len.min(self.tokens.len())..]
    }
}

/// Bound one row to `prompt_len + max_gen_len` and cut it at the first
/// `eos_id` (exclusive).
#[must_use]
pub fn assemble_row(
    row: &[u32],
    prompt_len: usize,
    max_gen_len: usize,
    eos_id: u32,
) -> (&[u32], FinishReason) {
    let bound = prompt_len.saturating_add(max_gen_len).min(row.len());
    let row = &row[..bound];
    match row.iter().position(|&t| t == eos_id) {
        Some(eos) => (&row[..eos], FinishReason::Stop),
        None => (row, FinishReason::Length),
    }
}

/// Assemble every row of a finished batch, in row order.
#[must_use]
pub fn assemble(batch: &TokenBatch, max_gen_len: usize, eos_id: u32) -> Vec<Completion> {
    batch
        .rows()
        .zip(batch.prompt_lens())
        .map(|(row, &prompt_len)| {
            let (tokens, finish_reason) = assemble_row(row, prompt_len, max_gen_len, eos_id);
            Completion {
                tokens: tokens.to_vec(),
                prompt_len,
                finish_reason,
            }
        })
        .collect()
}
