//! Padded sequence buffer for lockstep decoding.
//!
//! Prompts of different lengths share one `(batch_size, total_len)` buffer.
//! Unfilled cells hold `pad_id`, and a prompt mask marks the cells that came
//! from the caller so generation never overwrites them.

use crate::{Error, Result};

/// Length of the shortest prompt, or 0 for an empty batch.
#[must_use]
pub fn min_prompt_len(prompts: &[Vec<u32>]) -> usize {
    prompts.iter().map(Vec::len).min().unwrap_or(0)
}

/// Length of the longest prompt, or 0 for an empty batch.
#[must_use]
pub fn max_prompt_len(prompts: &[Vec<u32>]) -> usize {
    prompts.iter().map(Vec::len).max().unwrap_or(0)
}

/// Buffer width for a generation call: room for the longest prompt plus
/// `max_gen_len` tokens, capped at the model's sequence limit.
#[must_use]
pub fn total_len(max_seq_len: usize, max_gen_len: usize, max_prompt_len: usize) -> usize {
    max_seq_len.min(max_gen_len.saturating_add(max_prompt_len))
}

/// Row-major token buffer with its prompt mask.
#[derive(Debug, Clone)]
pub struct TokenBatch {
    tokens: Vec<u32>,
    prompt_mask: Vec<bool>,
    prompt_lens: Vec<usize>,
    batch_size: usize,
    total_len: usize,
    pad_id: u32,
}

impl TokenBatch {
    /// Seed a buffer with `prompts`, one per row, starting at column 0.
    ///
    /// # Errors
    /// - [`Error::EmptyBatch`] if `prompts` is empty
    /// - [`Error::BatchTooLarge`] if there are more than `max_batch_size` prompts
    /// - [`Error::EmptyPrompt`] if a prompt has no tokens
    /// - [`Error::PromptTooLong`] if a prompt does not fit in `total_len`
    pub fn new(
        prompts: &[Vec<u32>],
        pad_id: u32,
        total_len: usize,
        max_batch_size: usize,
    ) -> Result<Self> {
        let batch_size = prompts.len();
        if batch_size == 0 {
            return Err(Error::EmptyBatch);
        }
        if batch_size > max_batch_size {
            return Err(Error::BatchTooLarge {
                got: batch_size,
                max: max_batch_size,
            });
        }

        let mut tokens = vec![pad_id; batch_size * total_len];
        let mut prompt_mask = vec![false; batch_size * total_len];
        let mut prompt_lens = Vec::with_capacity(batch_size);

        for (index, prompt) in prompts.iter().enumerate() {
            if prompt.is_empty() {
                return Err(Error::EmptyPrompt(index));
            }
            if prompt.len() > total_len {
                return Err(Error::PromptTooLong {
                    index,
                    len: prompt.len(),
                    max: total_len,
                });
            }
            let start = index * total_len;
            tokens[start..start + prompt.len()].copy_from_slice(prompt);
            prompt_mask[start..start + prompt.len()].fill(true);
            prompt_lens.push(prompt.len());
        }

        Ok(Self {
            tokens,
            prompt_mask,
            prompt_lens,
            batch_size,
            total_len,
            pad_id,
        })
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    #[must_use]
    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Number of prompt tokens in `row`.
    #[must_use]
    pub fn prompt_len(&self, row: usize) -> usize {
        self.prompt_lens[row]
    }

    /// Prompt lengths for every row.
    #[must_use]
    pub fn prompt_lens(&self) -> &[usize] {
        &self.prompt_lens
    }

    /// Shortest prompt in the batch; decoding starts at this column.
    #[must_use]
    pub fn min_prompt_len(&self) -> usize {
        self.prompt_lens.iter().copied().min().unwrap_or(0)
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.tokens[row * self.total_len + col]
    }

    /// Whether the cell at (`row`, `col`) holds an original prompt token.
    #[must_use]
    pub fn is_prompt(&self, row: usize, col: usize) -> bool {
        self.prompt_mask[row * self.total_len + col]
    }

    /// The full row, including trailing padding.
    #[must_use]
    pub fn row(&self, row: usize) -> &[u32] {
        let start = row * self.total_len;
        &self.tokens[start..start + self.total_len]
    }

    /// Iterate over full rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        self.tokens.chunks_exact(self.total_len.max(1))
    }

    /// One token per row at column `col`.
    #[must_use]
    pub fn column(&self, col: usize) -> Vec<u32> {
        (0..self.batch_size).map(|row| self.get(row, col)).collect()
    }

    /// Write one token per row into column `col`.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `tokens` does not have one entry
    /// per row, or [`Error::InvalidShape`] if `col` is out of range.
    pub fn set_column(&mut self, col: usize, tokens: &[u32]) -> Result<()> {
        if tokens.len() != self.batch_size {
            return Err(Error::ShapeMismatch {
                expected: vec![self.batch_size],
                got: vec![tokens.len()],
            });
        }
        if col >= self.total_len {
            return Err(Error::InvalidShape(format!(
                "column {col} out of range for buffer of width {}",
                self.total_len
            )));
        }
        for (row, &token) in tokens.iter().enumerate() {
            self.tokens[row * self.total_len + col] = token;
        }
        Ok(())
    }

    /// Borrow columns `[start, end)` across all rows.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] if the range is empty or out of bounds.
    pub fn window(&self, start: usize, end: usize) -> Result<TokenWindow<'_>> {
        if start >= end || end > self.total_len {
            return Err(Error::InvalidShape(format!(
                "window [{start}, {end}) invalid for buffer of width {}",
                self.total_len
            )));
        }
        Ok(TokenWindow {
            batch: self,
            start,
            end,
        })
    }
}

/// Borrowed view of a column range of a [`TokenBatch`].
#[derive(Debug, Clone, Copy)]
pub struct TokenWindow<'a> {
    batch: &'a TokenBatch,
    start: usize,
    end: usize,
}

impl<'a> TokenWindow<'a> {
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch.batch_size
    }

    /// Number of columns in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Absolute position of the first column.
    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    /// The window's slice of `row`.
    #[must_use]
    pub fn row(&self, row: usize) -> &'a [u32] {
        let base = row * self.batch.total_len;
        &self.batch.tokens[base + self.start..base + self.end]
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [u32]> + '_ {
        (0..self.batch_size()).map(move |row| self.row(row))
    }

    /// Copy the window out as a dense `(batch_size, len)` row-major vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u32> {
        self.rows().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAD: u32 = 0;

    fn prompts() -> Vec<Vec<u32>> {
        vec![vec![12], vec![5, 6, 7, 9, 10]]
    }

    #[test]
    fn prompt_length_helpers() {
        assert_eq!(min_prompt_len(&prompts()), 1);
        assert_eq!(max_prompt_len(&prompts()), 5);
        assert_eq!(min_prompt_len(&[]), 0);
        assert_eq!(total_len(512, 2, 5), 7);
        assert_eq!(total_len(6, 2, 5), 6);
    }

    #[test]
    fn seeds_rows_and_pads_the_rest() {
        let batch = TokenBatch::new(&prompts(), PAD, 7, 4).unwrap();
        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.total_len(), 7);
        assert_eq!(batch.row(0), &[12, PAD, PAD, PAD, PAD, PAD, PAD]);
        assert_eq!(batch.row(1), &[5, 6, 7, 9, 10, PAD, PAD]);
        assert_eq!(batch.prompt_lens(), &[1, 5]);
        assert_eq!(batch.min_prompt_len(), 1);
    }

    #[test]
    fn mask_covers_prompt_cells_only() {
        let batch = TokenBatch::new(&prompts(), PAD, 7, 4).unwrap();
        assert!(batch.is_prompt(0, 0));
        assert!(!batch.is_prompt(0, 1));
        assert!((0..5).all(|c| batch.is_prompt(1, c)));
        assert!(!batch.is_prompt(1, 5));
    }

    #[test]
    fn mask_protects_prompt_tokens_equal_to_pad() {
        let batch = TokenBatch::new(&[vec![3, PAD, 4]], PAD, 5, 1).unwrap();
        assert!(batch.is_prompt(0, 1));
    }

    #[test]
    fn rejects_oversized_batch() {
        let err = TokenBatch::new(&prompts(), PAD, 7, 1).unwrap_err();
        assert!(matches!(err, Error::BatchTooLarge { got: 2, max: 1 }));
    }

    #[test]
    fn rejects_empty_inputs() {
        assert!(matches!(
            TokenBatch::new(&[], PAD, 4, 4),
            Err(Error::EmptyBatch)
        ));
        assert!(matches!(
            TokenBatch::new(&[vec![1], vec![]], PAD, 4, 4),
            Err(Error::EmptyPrompt(1))
        ));
    }

    #[test]
    fn rejects_prompt_wider_than_buffer() {
        let err = TokenBatch::new(&prompts(), PAD, 4, 4).unwrap_err();
        assert!(matches!(
            err,
            Error::PromptTooLong {
                index: 1,
                len: 5,
                max: 4
            }
        ));
    }

    #[test]
    fn window_slices_columns() {
        let batch = TokenBatch::new(&prompts(), PAD, 7, 4).unwrap();
        let window = batch.window(0, 2).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window.start(), 0);
        assert_eq!(window.row(0), &[12, PAD]);
        assert_eq!(window.row(1), &[5, 6]);
        assert_eq!(window.to_vec(), vec![12, PAD, 5, 6]);

        let window = batch.window(4, 5).unwrap();
        assert_eq!(window.to_vec(), vec![PAD, 10]);
    }

    #[test]
    fn window_rejects_bad_ranges() {
        let batch = TokenBatch::new(&prompts(), PAD, 7, 4).unwrap();
        assert!(batch.window(3, 3).is_err());
        assert!(batch.window(5, 8).is_err());
    }

    #[test]
    fn set_column_writes_every_row() {
        let mut batch = TokenBatch::new(&prompts(), PAD, 7, 4).unwrap();
        batch.set_column(5, &[40, 41]).unwrap();
        assert_eq!(batch.column(5), vec![40, 41]);
        assert!(batch.set_column(5, &[1]).is_err());
        assert!(batch.set_column(7, &[1, 2]).is_err());
    }
}
