//! Step-by-step decode loop over a padded batch.
//!
//! All rows advance one column per step. A row whose prompt still covers
//! the current column keeps its prompt token; every other row gets the
//! token chosen by the sampling policy. Decoding is a single sequential
//! pass: a failed step aborts the whole batch.

#![allow(clippy::cast_precision_loss)]

use lockstep::sampling::mix_seed;
use lockstep::{Error, Logits, Model, Result, SamplingParams, SamplingPolicy, TokenBatch};

/// Where a [`DecodeState`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePhase {
    /// No forward pass has run yet.
    NotStarted,
    /// At least one step has run and columns remain.
    Stepping,
    /// Every column of the buffer is filled.
    Done,
}

/// Column range fed to the model on the next step: `[prev_pos, cur_pos)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub prev_pos: usize,
    pub cur_pos: usize,
}

/// Buffer, cursor and phase of one generation call.
#[derive(Debug, Clone)]
pub struct DecodeState {
    batch: TokenBatch,
    cursor: Cursor,
    phase: DecodePhase,
}

impl DecodeState {
    /// Start decoding at the shortest prompt's end.
    #[must_use]
    pub fn new(batch: TokenBatch) -> Self {
        let start_pos = batch.min_prompt_len();
        let phase = if start_pos >= batch.total_len() {
            DecodePhase::Done
        } else {
            DecodePhase::NotStarted
        };
        Self {
            cursor: Cursor {
                prev_pos: 0,
                cur_pos: start_pos,
            },
            batch,
            phase,
        }
    }

    #[must_use]
    pub fn batch(&self) -> &TokenBatch {
        &self.batch
    }

    #[must_use]
    pub fn into_batch(self) -> TokenBatch {
        self.batch
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn phase(&self) -> DecodePhase {
        self.phase
    }

    /// Steps left before the buffer is full.
    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        if self.phase == DecodePhase::Done {
            0
        } else {
            self.batch.total_len() - self.cursor.cur_pos
        }
    }
}

/// Drives a model over a [`DecodeState`], one column per step.
///
/// Owns the model's cache for the duration of one generation call.
pub struct Decoder<'m, M: Model> {
    model: &'m M,
    cache: M::Cache,
    sampling: SamplingParams,
    batch_size: usize,
    total_len: usize,
}

impl<'m, M: Model> Decoder<'m, M> {
    /// Allocate the model cache sized for `state`'s buffer.
    ///
    /// # Errors
    /// Returns an error if the model cannot allocate its cache.
    pub fn new(model: &'m M, state: &DecodeState, sampling: SamplingParams) -> Result<Self> {
        let batch_size = state.batch.batch_size();
        let total_len = state.batch.total_len();
        let cache = model.allocate_cache(batch_size, total_len)?;
        Ok(Self {
            model,
            cache,
            sampling,
            batch_size,
            total_len,
        })
    }

    /// Run one step: forward the current window, choose a token per row,
    /// write column `cur_pos`, and advance the cursor.
    ///
    /// Returns the phase after the step. Stepping a finished state is a
    /// no-op.
    ///
    /// # Errors
    /// Returns an error if the forward pass or sampling fails, if `state`
    /// has a different shape than the one the cache was allocated for, or
    /// if the model returns logits for the wrong number of rows.
    pub fn step(&mut self, state: &mut DecodeState) -> Result<DecodePhase> {
        if state.phase == DecodePhase::Done {
            return Ok(DecodePhase::Done);
        }

        let Cursor { prev_pos, cur_pos } = state.cursor;
        let batch_size = state.batch.batch_size();
        let total_len = state.batch.total_len();
        if (batch_size, total_len) != (self.batch_size, self.total_len) {
            return Err(Error::ShapeMismatch {
                expected: vec![self.batch_size, self.total_len],
                got: vec![batch_size, total_len],
            });
        }

        let window = state.batch.window(prev_pos, cur_pos)?;
        let logits = self.model.forward(&window, prev_pos, &mut self.cache)?;
        if logits.batch_size() != batch_size {
            return Err(Error::ShapeMismatch {
                expected: vec![batch_size, logits.vocab_size()],
                got: vec![logits.batch_size(), logits.vocab_size()],
            });
        }

        let policy = self.sampling.policy();
        let mut next = Vec::with_capacity(batch_size);
        for row in 0..batch_size {
            if state.batch.is_prompt(row, cur_pos) {
                next.push(state.batch.get(row, cur_pos));
                continue;
            }
            let token = select_token(&logits, row, policy, self.sampling.seed, cur_pos)?;
            if token as usize >= logits.vocab_size() {
                return Err(Error::InvalidShape(format!(
                    "sampled token {token} outside vocabulary of {}",
                    logits.vocab_size()
                )));
            }
            tracing::trace!(row, cur_pos, token, "selected token");
            next.push(token);
        }
        state.batch.set_column(cur_pos, &next)?;

        state.cursor = Cursor {
            prev_pos: cur_pos,
            cur_pos: cur_pos + 1,
        };
        state.phase = if state.cursor.cur_pos >= total_len {
            DecodePhase::Done
        } else {
            DecodePhase::Stepping
        };

        tracing::debug!(
            cur_pos,
            total_len,
            progress_pct = progress_pct(cur_pos, total_len),
            "decode step"
        );
        Ok(state.phase)
    }

    /// Step until every column is filled.
    ///
    /// # Errors
    /// Returns the first step error; the state is left where it failed.
    pub fn run(&mut self, state: &mut DecodeState) -> Result<()> {
        while self.step(state)? != DecodePhase::Done {}
        Ok(())
    }
}

fn progress_pct(cur_pos: usize, total_len: usize) -> f64 {
    cur_pos as f64 / total_len as f64 * 100.0
}

/// Choose the next token for one row, either greedily or by nucleus sampling.
///
/// Sampled draws are seeded per `(row, position)` so a row's randomness is
/// independent of the rest of the batch.
fn select_token<L: Logits>(
    logits: &L,
    row: usize,
    policy: SamplingPolicy,
    seed: u64,
    position: usize,
) -> Result<u32> {
    match policy {
        SamplingPolicy::Greedy => logits.argmax(row),
        SamplingPolicy::TopP { temperature, top_p } => {
            logits.sample_top_p(row, temperature, top_p, mix_seed(seed, row, position))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep::{ModelConfig, TokenWindow};
    use std::cell::RefCell;

    const PAD: u32 = 0;
    const VOCAB: usize = 64;

    /// Host logits that put all mass on one token per row.
    struct OneHot {
        rows: Vec<u32>,
    }

    impl Logits for OneHot {
        fn vocab_size(&self) -> usize {
            VOCAB
        }

        fn batch_size(&self) -> usize {
            self.rows.len()
        }

        fn argmax(&self, batch_index: usize) -> Result<u32> {
            Ok(self.rows[batch_index])
        }

        fn sample_top_p(&self, batch_index: usize, _: f32, _: f32, _: u64) -> Result<u32> {
            Ok(self.rows[batch_index])
        }
    }

    /// Predicts `last + 10` and records every call.
    struct PlusTen {
        calls: RefCell<Vec<(usize, Vec<u32>)>>,
        short_rows: bool,
    }

    impl PlusTen {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                short_rows: false,
            }
        }
    }

    impl Model for PlusTen {
        type Logits = OneHot;
        type Cache = ();

        fn config(&self) -> ModelConfig {
            ModelConfig {
                vocab_size: VOCAB,
                max_batch_size: 4,
                max_seq_len: 32,
            }
        }

        fn allocate_cache(&self, _: usize, _: usize) -> Result<()> {
            Ok(())
        }

        fn forward(&self, window: &TokenWindow<'_>, start_pos: usize, _: &mut ()) -> Result<OneHot> {
            self.calls.borrow_mut().push((start_pos, window.to_vec()));
            let mut rows: Vec<u32> = window
                .rows()
                .map(|r| (r[r.len() - 1] + 10) % VOCAB as u32)
                .collect();
            if self.short_rows {
                rows.pop();
            }
            Ok(OneHot { rows })
        }
    }

    fn state() -> DecodeState {
        let batch = TokenBatch::new(&[vec![1], vec![2, 3, 4]], PAD, 5, 4).unwrap();
        DecodeState::new(batch)
    }

    #[test]
    fn starts_at_shortest_prompt() {
        let state = state();
        assert_eq!(state.phase(), DecodePhase::NotStarted);
        assert_eq!(
            state.cursor(),
            Cursor {
                prev_pos: 0,
                cur_pos: 1
            }
        );
        assert_eq!(state.remaining_steps(), 4);
    }

    #[test]
    fn step_protects_prompt_and_advances() {
        let model = PlusTen::new();
        let mut state = state();
        let mut decoder = Decoder::new(&model, &state, SamplingParams::greedy()).unwrap();

        assert_eq!(decoder.step(&mut state).unwrap(), DecodePhase::Stepping);
        // Row 0 generated 1 + 10; row 1 kept its prompt token.
        assert_eq!(state.batch().column(1), vec![11, 3]);
        assert_eq!(
            state.cursor(),
            Cursor {
                prev_pos: 1,
                cur_pos: 2
            }
        );
    }

    #[test]
    fn run_fills_buffer_in_lockstep() {
        let model = PlusTen::new();
        let mut state = state();
        let mut decoder = Decoder::new(&model, &state, SamplingParams::greedy()).unwrap();
        decoder.run(&mut state).unwrap();

        assert_eq!(state.phase(), DecodePhase::Done);
        assert_eq!(state.remaining_steps(), 0);
        assert_eq!(state.batch().row(0), &[1, 11, 21, 31, 41]);
        assert_eq!(state.batch().row(1), &[2, 3, 4, 14, 24]);

        let calls = model.calls.borrow();
        let starts: Vec<usize> = calls.iter().map(|(s, _)| *s).collect();
        assert_eq!(starts, vec![0, 1, 2, 3]);
        // First window is the shared prefix, later windows one column wide.
        assert_eq!(calls[0].1, vec![1, 2]);
        assert_eq!(calls[1].1, vec![11, 3]);
        assert_eq!(calls[3].1, vec![31, 14]);
    }

    #[test]
    fn step_after_done_is_noop() {
        let model = PlusTen::new();
        let mut state = state();
        let mut decoder = Decoder::new(&model, &state, SamplingParams::greedy()).unwrap();
        decoder.run(&mut state).unwrap();
        let calls = model.calls.borrow().len();

        assert_eq!(decoder.step(&mut state).unwrap(), DecodePhase::Done);
        assert_eq!(model.calls.borrow().len(), calls);
    }

    #[test]
    fn full_prompts_need_no_steps() {
        let batch = TokenBatch::new(&[vec![1, 2, 3]], PAD, 3, 4).unwrap();
        let mut state = DecodeState::new(batch);
        assert_eq!(state.phase(), DecodePhase::Done);

        let model = PlusTen::new();
        let mut decoder = Decoder::new(&model, &state, SamplingParams::greedy()).unwrap();
        decoder.run(&mut state).unwrap();
        assert!(model.calls.borrow().is_empty());
    }

    #[test]
    fn wrong_logits_batch_aborts() {
        let model = PlusTen {
            short_rows: true,
            ..PlusTen::new()
        };
        let mut state = state();
        let mut decoder = Decoder::new(&model, &state, SamplingParams::default()).unwrap();
        let err = decoder.run(&mut state).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert_eq!(state.phase(), DecodePhase::NotStarted);
    }

    #[test]
    fn state_of_other_shape_is_rejected() {
        let model = PlusTen::new();
        let mut decoder = Decoder::new(&model, &state(), SamplingParams::greedy()).unwrap();

        let wider = TokenBatch::new(&[vec![1], vec![2, 3, 4]], PAD, 6, 4).unwrap();
        let mut wider = DecodeState::new(wider);
        let err = decoder.step(&mut wider).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch { expected, got } if expected == vec![2, 5] && got == vec![2, 6]
        ));
        assert!(model.calls.borrow().is_empty());
        assert_eq!(wider.phase(), DecodePhase::NotStarted);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn progress_counts_written_column() {
        assert_eq!(progress_pct(1, 4), 25.0);
        assert_eq!(progress_pct(0, 8), 0.0);
    }
}
