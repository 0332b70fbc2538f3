//! Tokenizer integration
//!
//! Defines the [`Tokenizer`] trait and a `tokenizers`-backed implementation.

mod hf_tokenizer;

use crate::Result;

pub use hf_tokenizer::HfTokenizer;

/// Trait for tokenizers that convert between text and token IDs.
///
/// The runtime encodes each prompt with BOS and without EOS, pads the batch
/// with [`Tokenizer::pad_token_id`], and cuts completions at
/// [`Tokenizer::eos_token_id`].
pub trait Tokenizer {
    /// Encode text to token IDs.
    ///
    /// # Arguments
    /// * `text` - The text to encode
    /// * `add_bos` - Whether to prepend the beginning-of-sequence token
    /// * `add_eos` - Whether to append the end-of-sequence token
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    fn encode(&self, text: &str, add_bos: bool, add_eos: bool) -> Result<Vec<u32>>;

    /// Decode token IDs to text.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Get the beginning-of-sequence token ID.
    fn bos_token_id(&self) -> u32;

    /// Get the end-of-sequence token ID.
    fn eos_token_id(&self) -> u32;

    /// Get the token ID used to fill unwritten buffer cells.
    fn pad_token_id(&self) -> u32;
}
