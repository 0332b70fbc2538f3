//! Model trait for batched decoding
//!
//! Defines the predictor interface the decoder drives. A model is a
//! stateful collaborator: the decoder allocates one cache per generation
//! call, feeds it every window in order, and drops it when the call ends.

use serde::Deserialize;

use crate::batch::TokenWindow;
use crate::logits::Logits;
use crate::Result;

/// Capacity limits and vocabulary size the decoder must respect.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Number of logits produced per row
    pub vocab_size: usize,
    /// Maximum number of prompts in one generation call
    pub max_batch_size: usize,
    /// Maximum sequence length (prompt + generated) the model supports
    pub max_seq_len: usize,
}

/// Trait for next-token predictors.
///
/// The decoder calls [`Model::forward`] once per step with the window of
/// columns `[start_pos, start_pos + window.len())`. The first call carries
/// the shared prompt prefix; every later call carries exactly one column.
/// Implementations keep whatever context they need in [`Model::Cache`].
pub trait Model {
    /// Logits type returned by a forward pass.
    type Logits: Logits;

    /// Per-generation incremental state (e.g. a KV cache).
    type Cache;

    /// Get the model configuration.
    fn config(&self) -> ModelConfig;

    /// Allocate a fresh cache for one generation call.
    ///
    /// # Errors
    /// Returns an error if allocation fails.
    fn allocate_cache(&self, batch_size: usize, total_len: usize) -> Result<Self::Cache>;

    /// Forward pass over one window of the sequence buffer.
    ///
    /// # Arguments
    /// * `window` - Token ids of shape (`batch_size`, `window_len`)
    /// * `start_pos` - Absolute position of the window's first column
    /// * `cache` - State carried over from earlier calls in this generation
    ///
    /// # Returns
    /// Logits for the last window column, one row per batch row.
    ///
    /// # Errors
    /// Returns an error if the forward pass fails.
    fn forward(
        &self,
        window: &TokenWindow<'_>,
        start_pos: usize,
        cache: &mut Self::Cache,
    ) -> Result<Self::Logits>;
}
