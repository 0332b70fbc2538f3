//! Shared helpers for runtime integration tests.
//!
//! A byte-level tokenizer and a few scripted models with known outputs.

#![allow(dead_code)]

use std::sync::Mutex;

use lockstep::batch::TokenWindow;
use lockstep::{Error, GenerateOptions, Model, ModelConfig, Result, SamplingParams, Tokenizer};
use lockstep_cpu::{BigramModel, CpuLogits};

pub const PAD: u32 = 0;
pub const BOS: u32 = 1;
pub const EOS: u32 = 2;
/// Byte `b` encodes to `b + BYTE_OFFSET`.
pub const BYTE_OFFSET: u32 = 3;
pub const VOCAB: usize = 256 + BYTE_OFFSET as usize;

/// One token per byte, shifted past the special ids.
pub struct ByteTokenizer;

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str, add_bos: bool, add_eos: bool) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(text.len() + 2);
        if add_bos {
            ids.push(BOS);
        }
        ids.extend(text.bytes().map(|b| u32::from(b) + BYTE_OFFSET));
        if add_eos {
            ids.push(EOS);
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let bytes = ids
            .iter()
            .filter(|&&id| id >= BYTE_OFFSET)
            .map(|&id| u8::try_from(id - BYTE_OFFSET))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| Error::Tokenizer(e.to_string()))
    }

    fn bos_token_id(&self) -> u32 {
        BOS
    }

    fn eos_token_id(&self) -> u32 {
        EOS
    }

    fn pad_token_id(&self) -> u32 {
        PAD
    }
}

pub fn config(max_batch_size: usize, max_seq_len: usize) -> ModelConfig {
    ModelConfig {
        vocab_size: VOCAB,
        max_batch_size,
        max_seq_len,
    }
}

pub fn greedy_options(max_gen_len: usize) -> GenerateOptions {
    GenerateOptions::greedy(max_gen_len)
}

pub fn sampled_options(max_gen_len: usize, seed: u64) -> GenerateOptions {
    GenerateOptions {
        max_gen_len,
        sampling: SamplingParams {
            temperature: 1.0,
            top_p: 0.9,
            seed,
        },
    }
}

/// Token id for an ASCII character.
pub fn tok(c: char) -> u32 {
    c as u32 + BYTE_OFFSET
}

/// Greedy bigram chain over lowercase letters: `a -> b -> ... -> z -> a`,
/// and `!` followed by EOS.
pub fn alphabet_model(max_batch_size: usize, max_seq_len: usize) -> BigramModel {
    let mut transitions: Vec<(u32, u32)> = ('a'..='y')
        .map(|c| (tok(c), tok(char::from(c as u8 + 1))))
        .collect();
    transitions.push((tok('z'), tok('a')));
    transitions.push((tok('!'), EOS));
    BigramModel::from_transitions(config(max_batch_size, max_seq_len), &transitions)
        .expect("valid transitions")
}

/// A bigram model whose rows are spread over the letters `a..=h`, so
/// sampling actually has choices to make. Every other token is impossible.
pub fn noisy_model(max_batch_size: usize, max_seq_len: usize) -> BigramModel {
    let mut table = vec![f32::NEG_INFINITY; VOCAB * VOCAB];
    for from in 0..VOCAB {
        for (k, c) in ('a'..='h').enumerate() {
            let to = tok(c) as usize;
            table[from * VOCAB + to] = 4.0 - (k as f32 + from as f32 % 3.0) * 0.3;
        }
    }
    BigramModel::new(config(max_batch_size, max_seq_len), table).expect("square table")
}

/// A model that records every forward call and can be told to fail.
pub struct RecordingModel {
    inner: BigramModel,
    pub calls: Mutex<Vec<(usize, usize)>>,
    fail_on_call: Option<usize>,
}

impl RecordingModel {
    pub fn new(inner: BigramModel) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            fail_on_call: None,
        }
    }

    pub fn failing_on(inner: BigramModel, call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::new(inner)
        }
    }

    /// `(start_pos, window_len)` of every forward call so far.
    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Model for RecordingModel {
    type Logits = CpuLogits;
    type Cache = <BigramModel as Model>::Cache;

    fn config(&self) -> ModelConfig {
        self.inner.config()
    }

    fn allocate_cache(&self, batch_size: usize, total_len: usize) -> Result<Self::Cache> {
        self.inner.allocate_cache(batch_size, total_len)
    }

    fn forward(
        &self,
        window: &TokenWindow<'_>,
        start_pos: usize,
        cache: &mut Self::Cache,
    ) -> Result<CpuLogits> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((start_pos, window.len()));
        if self.fail_on_call == Some(calls.len()) {
            return Err(Error::Other("device lost".into()));
        }
        self.inner.forward(window, start_pos, cache)
    }
}
