//! CPU logits implementation with host-side sampling.

use rand::rngs::StdRng;
use rand::SeedableRng;

use lockstep::logits::Logits;
use lockstep::sampling;
use lockstep::{Error, Result};

/// CPU logits: f32 rows already on host, sampling is scalar.
#[derive(Debug, Clone)]
pub struct CpuLogits {
    data: Vec<f32>,
    vocab_size: usize,
    batch_size: usize,
}

impl CpuLogits {
    /// Wrap `batch_size` rows of `vocab_size` logits stored row-major.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if `data` is not `batch_size * vocab_size` long.
    pub fn new(data: Vec<f32>, batch_size: usize, vocab_size: usize) -> Result<Self> {
        if data.len() != batch_size * vocab_size {
            return Err(Error::ShapeMismatch {
                expected: vec![batch_size, vocab_size],
                got: vec![data.len()],
            });
        }
        Ok(Self {
            data,
            vocab_size,
            batch_size,
        })
    }

    /// Build from one vector per row.
    ///
    /// # Errors
    /// Returns an error if the rows are empty or of unequal width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let batch_size = rows.len();
        let vocab_size = rows.first().map_or(0, Vec::len);
        if vocab_size == 0 {
            return Err(Error::InvalidShape("logits need at least one column".into()));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != vocab_size) {
            return Err(Error::ShapeMismatch {
                expected: vec![vocab_size],
                got: vec![bad.len()],
            });
        }
        Self::new(rows.concat(), batch_size, vocab_size)
    }

    /// One row of logits.
    ///
    /// # Errors
    /// Returns [`Error::InvalidShape`] if `batch_index` is out of range.
    pub fn row(&self, batch_index: usize) -> Result<&[f32]> {
        if batch_index >= self.batch_size {
            return Err(Error::InvalidShape(format!(
                "row {batch_index} out of range for {} logits rows",
                self.batch_size
            )));
        }
        let start = batch_index * self.vocab_size;
        Ok(&self.data[start..start + self.vocab_size])
    }
}

impl Logits for CpuLogits {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn argmax(&self, batch_index: usize) -> Result<u32> {
        sampling::argmax(self.row(batch_index)?)
    }

    fn sample_top_p(
        &self,
        batch_index: usize,
        temperature: f32,
        top_p: f32,
        rng_seed: u64,
    ) -> Result<u32> {
        let mut rng = StdRng::seed_from_u64(rng_seed);
        sampling::sample_top_p(self.row(batch_index)?, temperature, top_p, &mut rng)
    }
}
