//! Table-driven bigram predictor.
//!
//! Next-token logits depend only on the previous token: row `t` of a
//! `vocab_size × vocab_size` table holds the logits that follow token `t`.
//! The cache tracks how many positions have been consumed so the model
//! can reject windows that do not continue the previous call.

use std::path::Path;

use serde::Deserialize;

use lockstep::batch::TokenWindow;
use lockstep::{Error, Model, ModelConfig, Result};

use crate::logits::CpuLogits;

/// Logit given to the designated successor in [`BigramModel::from_transitions`].
const TRANSITION_LOGIT: f32 = 10.0;

/// A bigram language model over a dense logits table.
#[derive(Debug, Clone)]
pub struct BigramModel {
    config: ModelConfig,
    table: Vec<f32>,
}

/// On-disk form of a [`BigramModel`].
#[derive(Debug, Deserialize)]
struct BigramFile {
    max_batch_size: usize,
    max_seq_len: usize,
    table: Vec<Vec<f32>>,
}

/// Incremental state for one generation call.
#[derive(Debug, Clone)]
pub struct BigramCache {
    batch_size: usize,
    capacity: usize,
    next_pos: usize,
    last_tokens: Vec<u32>,
}

impl BigramCache {
    /// Number of positions consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.next_pos
    }

    /// Last token seen in each row.
    #[must_use]
    pub fn last_tokens(&self) -> &[u32] {
        &self.last_tokens
    }
}

impl BigramModel {
    /// Build from a row-major `vocab_size × vocab_size` table.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the table is not square in
    /// `config.vocab_size`.
    pub fn new(config: ModelConfig, table: Vec<f32>) -> Result<Self> {
        let vocab = config.vocab_size;
        if vocab == 0 || table.len() != vocab * vocab {
            return Err(Error::ShapeMismatch {
                expected: vec![vocab, vocab],
                got: vec![table.len()],
            });
        }
        Ok(Self { config, table })
    }

    /// A model where token `from` is followed by `to` with high probability
    /// for every `(from, to)` pair, and uniformly otherwise.
    ///
    /// # Errors
    /// Returns an error if a pair references a token outside the vocabulary.
    pub fn from_transitions(config: ModelConfig, transitions: &[(u32, u32)]) -> Result<Self> {
        let vocab = config.vocab_size;
        let mut table = vec![0.0f32; vocab * vocab];
        for &(from, to) in transitions {
            let (from, to) = (from as usize, to as usize);
            if from >= vocab || to >= vocab {
                return Err(Error::InvalidShape(format!(
                    "transition {from} -> {to} outside vocabulary of {vocab}"
                )));
            }
            table[from * vocab + to] = TRANSITION_LOGIT;
        }
        Self::new(config, table)
    }

    /// Load a model from a JSON file with `max_batch_size`, `max_seq_len`
    /// and a square `table` of logits rows.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// # Errors
    /// Returns an error if the JSON is malformed or the table is not square.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: BigramFile = serde_json::from_str(json)?;
        let config = ModelConfig {
            vocab_size: file.table.len(),
            max_batch_size: file.max_batch_size,
            max_seq_len: file.max_seq_len,
        };
        if let Some(bad) = file.table.iter().find(|r| r.len() != config.vocab_size) {
            return Err(Error::ShapeMismatch {
                expected: vec![config.vocab_size],
                got: vec![bad.len()],
            });
        }
        Self::new(config, file.table.concat())
    }

    fn successor_logits(&self, token: u32) -> Result<&[f32]> {
        let vocab = self.config.vocab_size;
        let token = token as usize;
        if token >= vocab {
            return Err(Error::InvalidShape(format!(
                "token {token} outside vocabulary of {vocab}"
            )));
        }
        Ok(&self.table[token * vocab..(token + 1) * vocab])
    }
}

impl Model for BigramModel {
    type Logits = CpuLogits;
    type Cache = BigramCache;

    fn config(&self) -> ModelConfig {
        self.config.clone()
    }

    fn allocate_cache(&self, batch_size: usize, total_len: usize) -> Result<BigramCache> {
        if batch_size > self.config.max_batch_size {
            return Err(Error::BatchTooLarge {
                got: batch_size,
                max: self.config.max_batch_size,
            });
        }
        Ok(BigramCache {
            batch_size,
            capacity: total_len.min(self.config.max_seq_len),
            next_pos: 0,
            last_tokens: vec![0; batch_size],
        })
    }

    fn forward(
        &self,
        window: &TokenWindow<'_>,
        start_pos: usize,
        cache: &mut BigramCache,
    ) -> Result<CpuLogits> {
        if window.batch_size() != cache.batch_size {
            return Err(Error::ShapeMismatch {
                expected: vec![cache.batch_size],
                got: vec![window.batch_size()],
            });
        }
        if start_pos != cache.next_pos {
            return Err(Error::Other(format!(
                "window starts at {start_pos} but cache holds {} positions",
                cache.next_pos
            )));
        }
        let end = start_pos + window.len();
        if end > cache.capacity {
            return Err(Error::InvalidShape(format!(
                "position {end} exceeds cache capacity {}",
                cache.capacity
            )));
        }

        let vocab = self.config.vocab_size;
        let mut data = Vec::with_capacity(window.batch_size() * vocab);
        for (row, tokens) in window.rows().enumerate() {
            let Some(&last) = tokens.last() else {
                return Err(Error::InvalidShape("empty window".into()));
            };
            data.extend_from_slice(self.successor_logits(last)?);
            cache.last_tokens[row] = last;
        }
        cache.next_pos = end;

        tracing::trace!(start_pos, window_len = window.len(), "bigram forward");
        CpuLogits::new(data, window.batch_size(), vocab)
    }
}
