//! Text-level generation runtime
//!
//! The [`Runtime`] pairs a [`Model`] with a [`Tokenizer`], providing a
//! text-in, text-out interface for batched generation.

use lockstep::{
    max_prompt_len, total_len, Error, GenerateOptions, Model, ModelConfig, Result, TokenBatch,
    Tokenizer,
};

use crate::assemble::{assemble, Completion};
use crate::decoder::{DecodeState, Decoder};

/// Text-level inference runtime.
///
/// Each call to [`Runtime::generate`] builds a fresh buffer and model
/// cache, decodes every prompt in lockstep, and drops both on return.
pub struct Runtime<M: Model, T: Tokenizer> {
    model: M,
    tokenizer: T,
}

impl<M: Model, T: Tokenizer> Runtime<M, T> {
    /// Create a new runtime from a model and tokenizer.
    pub fn new(model: M, tokenizer: T) -> Self {
        Self { model, tokenizer }
    }

    /// Get a reference to the model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Get a reference to the tokenizer.
    #[must_use]
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    /// Get the model configuration.
    #[must_use]
    pub fn model_config(&self) -> ModelConfig {
        self.model.config()
    }

    /// Generate a completion for every prompt, blocking until done.
    ///
    /// # Arguments
    /// * `prompts` - Input texts, one batch row each
    /// * `options` - Generation length and sampling parameters
    ///
    /// # Returns
    /// One decoded string (prompt + completion) per prompt, in order.
    ///
    /// # Errors
    /// Returns an error if the batch is empty or too large, if tokenization
    /// fails, or if any forward pass fails. No partial results are returned.
    pub fn generate<S: AsRef<str>>(
        &self,
        prompts: &[S],
        options: &GenerateOptions,
    ) -> Result<Vec<String>> {
        self.check_batch_size(prompts.len())?;

        let prompt_tokens = prompts
            .iter()
            .map(|p| self.tokenizer.encode(p.as_ref(), true, false))
            .collect::<Result<Vec<_>>>()?;

        self.generate_tokens(&prompt_tokens, options)?
            .iter()
            .map(|c| self.tokenizer.decode(&c.tokens))
            .collect()
    }

    /// Token-level generation: pad, decode in lockstep, assemble.
    ///
    /// # Errors
    /// See [`Runtime::generate`].
    pub fn generate_tokens(
        &self,
        prompt_tokens: &[Vec<u32>],
        options: &GenerateOptions,
    ) -> Result<Vec<Completion>> {
        options.validate()?;
        self.check_batch_size(prompt_tokens.len())?;

        let config = self.model.config();
        let total_len = total_len(
            config.max_seq_len,
            options.max_gen_len,
            max_prompt_len(prompt_tokens),
        );
        let batch = TokenBatch::new(
            prompt_tokens,
            self.tokenizer.pad_token_id(),
            total_len,
            config.max_batch_size,
        )?;

        tracing::info!(
            batch_size = batch.batch_size(),
            min_prompt_len = batch.min_prompt_len(),
            total_len,
            max_gen_len = options.max_gen_len,
            temperature = options.sampling.temperature,
            top_p = options.sampling.top_p,
            "starting generation"
        );

        let mut state = DecodeState::new(batch);
        let mut decoder = Decoder::new(&self.model, &state, options.sampling.clone())?;
        decoder.run(&mut state)?;

        let completions = assemble(
            state.batch(),
            options.max_gen_len,
            self.tokenizer.eos_token_id(),
        );
        tracing::info!(
            generated = completions.iter().map(|c| c.generated().len()).sum::<usize>(),
            "generation finished"
        );
        Ok(completions)
    }

    fn check_batch_size(&self, batch_size: usize) -> Result<()> {
        let max = self.model.config().max_batch_size;
        if batch_size == 0 {
            return Err(Error::EmptyBatch);
        }
        if batch_size > max {
            return Err(Error::BatchTooLarge {
                got: batch_size,
                max,
            });
        }
        Ok(())
    }
}
