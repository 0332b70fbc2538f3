//! Opaque logits trait for backend-agnostic sampling.
//!
//! The decoder calls `argmax` or `sample_top_p` per row. It decides
//! *what* to do (greedy vs sampling), the backend decides *how*.

use crate::Result;

/// Opaque logits from a forward pass.
///
/// One logits row per batch row, each `vocab_size` wide. Backends return
/// their own type; the decoder only talks to it through this trait.
pub trait Logits: Send {
    /// Vocabulary size (number of logit values per row).
    fn vocab_size(&self) -> usize;

    /// Number of rows in this batch.
    fn batch_size(&self) -> usize;

    /// Greedy: the token index with the highest logit in `batch_index`.
    ///
    /// # Errors
    /// Returns an error if the underlying operation fails.
    fn argmax(&self, batch_index: usize) -> Result<u32>;

    /// Nucleus (top-p) sampling with temperature for one row.
    ///
    /// `rng_seed` fully determines the draw: the same logits, parameters and
    /// seed always produce the same token.
    ///
    /// # Errors
    /// Returns an error if the underlying operation fails.
    fn sample_top_p(
        &self,
        batch_index: usize,
        temperature: f32,
        top_p: f32,
        rng_seed: u64,
    ) -> Result<u32>;
}
