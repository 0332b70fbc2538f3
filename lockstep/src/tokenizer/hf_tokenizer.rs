//! Tokenizer backed by the `tokenizers` crate (`tokenizer.json` format)

use std::path::Path;

use crate::{Error, Result};

/// Wrapper around a `tokenizers::Tokenizer` with resolved special ids
pub struct HfTokenizer {
    tokenizer: tokenizers::Tokenizer,
    bos_token_id: u32,
    eos_token_id: u32,
    pad_token_id: u32,
}

impl HfTokenizer {
    /// Load a tokenizer from a directory containing tokenizer.json
    ///
    /// # Errors
    /// Returns an error if the tokenizer cannot be loaded
    pub fn from_pretrained(model_path: impl AsRef<Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = model_path.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(Error::Tokenizer(format!(
                "No tokenizer.json found in {}",
                model_path.display()
            )));
        }
        Self::from_file(&tokenizer_path)
    }

    /// Load a tokenizer from a tokenizer.json file
    ///
    /// # Errors
    /// Returns an error if the file cannot be parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path.as_ref())
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(Self::new(tokenizer))
    }

    /// Wrap an already constructed tokenizer.
    ///
    /// Special ids are looked up by their conventional spellings, with the
    /// SentencePiece defaults (BOS 1, EOS 2, PAD 0) as fallback.
    #[must_use]
    pub fn new(tokenizer: tokenizers::Tokenizer) -> Self {
        let bos_token_id = tokenizer
            .token_to_id("<|begin_of_text|>")
            .or_else(|| tokenizer.token_to_id("<s>"))
            .unwrap_or(1);

        let eos_token_id = tokenizer
            .token_to_id("<|end_of_text|>")
            .or_else(|| tokenizer.token_to_id("<|eot_id|>"))
            .or_else(|| tokenizer.token_to_id("</s>"))
            .unwrap_or(2);

        let pad_token_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("<pad>"))
            .or_else(|| tokenizer.token_to_id("<unk>"))
            .unwrap_or(0);

        tracing::debug!(bos_token_id, eos_token_id, pad_token_id, "resolved special tokens");

        Self {
            tokenizer,
            bos_token_id,
            eos_token_id,
            pad_token_id,
        }
    }

    /// Get the vocabulary size
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

impl super::Tokenizer for HfTokenizer {
    fn encode(&self, text: &str, add_bos: bool, add_eos: bool) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;

        let mut ids = Vec::with_capacity(encoding.len() + 2);
        if add_bos {
            ids.push(self.bos_token_id);
        }
        ids.extend_from_slice(encoding.get_ids());
        if add_eos {
            ids.push(self.eos_token_id);
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::Tokenizer(e.to_string()))
    }

    fn bos_token_id(&self) -> u32 {
        self.bos_token_id
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }
}
