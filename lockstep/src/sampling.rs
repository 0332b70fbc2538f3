//! Sampling parameters and the token-selection policy.
//!
//! Everything here is a pure function of a single logits row. Backends that
//! keep logits on the host (see `lockstep-cpu`) call straight into these;
//! the decoder reaches them through the [`Logits`](crate::Logits) trait.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::{Error, Result};

/// Parameters for nucleus (top-p) sampling
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingParams {
    /// Temperature for logit scaling (higher = more random).
    /// Zero or negative selects greedy (argmax) decoding.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus probability threshold in (0, 1]. Only tokens within the top-p
    /// cumulative probability mass are considered.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Seed for the PRNG. Same seed + same input → same output.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_temperature() -> f32 {
    0.8
}

fn default_top_p() -> f32 {
    0.95
}

fn default_seed() -> u64 {
    42
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            seed: default_seed(),
        }
    }
}

impl SamplingParams {
    /// Greedy parameters (temperature 0).
    #[must_use]
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// The selection policy these parameters describe.
    #[must_use]
    pub fn policy(&self) -> SamplingPolicy {
        if self.temperature > 0.0 {
            SamplingPolicy::TopP {
                temperature: self.temperature,
                top_p: self.top_p,
            }
        } else {
            SamplingPolicy::Greedy
        }
    }

    /// Check that the parameters describe a usable policy.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOptions`] for a NaN temperature, or a `top_p`
    /// outside `(0, 1]` when sampling is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.temperature.is_nan() || self.temperature.is_infinite() {
            return Err(Error::InvalidOptions(format!(
                "temperature must be finite, got {}",
                self.temperature
            )));
        }
        if self.temperature > 0.0 && !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::InvalidOptions(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

/// How the next token is chosen from a logits row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingPolicy {
    /// Deterministic argmax.
    Greedy,
    /// Temperature-scaled softmax, nucleus truncation, weighted draw.
    TopP { temperature: f32, top_p: f32 },
}

/// Options for a generation call.
///
/// Controls how many tokens each prompt may grow by and how tokens are
/// selected.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateOptions {
    /// Maximum number of tokens generated past each prompt.
    #[serde(default = "default_max_gen_len")]
    pub max_gen_len: usize,
    /// Sampling parameters. A non-positive temperature means greedy.
    #[serde(default)]
    pub sampling: SamplingParams,
}

fn default_max_gen_len() -> usize {
    64
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_gen_len: default_max_gen_len(),
            sampling: SamplingParams::default(),
        }
    }
}

impl GenerateOptions {
    /// Greedy decoding for up to `max_gen_len` tokens.
    #[must_use]
    pub fn greedy(max_gen_len: usize) -> Self {
        Self {
            max_gen_len,
            sampling: SamplingParams::greedy(),
        }
    }

    /// Parse options from a JSON string and validate them.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the options are invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// # Errors
    /// See [`SamplingParams::validate`].
    pub fn validate(&self) -> Result<()> {
        self.sampling.validate()
    }
}

/// Index of the largest logit. NaN is skipped, `+inf` wins, and ties
/// resolve to the lowest index.
///
/// # Errors
/// Returns [`Error::InvalidShape`] if `logits` is empty.
pub fn argmax(logits: &[f32]) -> Result<u32> {
    if logits.is_empty() {
        return Err(Error::InvalidShape("argmax over empty logits".into()));
    }
    let mut max_idx = 0u32;
    let mut max_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if !v.is_nan() && v > max_val {
            max_val = v;
            max_idx = i as u32;
        }
    }
    Ok(max_idx)
}

/// Temperature-scaled softmax.
///
/// If any logit is `+inf` the mass is split evenly over those entries.
/// Otherwise NaN and `-inf` get probability zero, and if nothing finite is
/// left the result is all zeros.
#[must_use]
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    let certain = logits.iter().filter(|&&v| v == f32::INFINITY).count();
    if certain > 0 {
        let share = 1.0 / certain as f32;
        return logits
            .iter()
            .map(|&v| if v == f32::INFINITY { share } else { 0.0 })
            .collect();
    }

    let max_logit = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if max_logit == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }

    let mut probs: Vec<f32> = logits
        .iter()
        .map(|&l| {
            if l.is_finite() {
                ((l - max_logit) / temperature).exp()
            } else {
                0.0
            }
        })
        .collect();
    let sum: f32 = probs.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return vec![0.0; logits.len()];
    }
    for p in &mut probs {
        *p /= sum;
    }
    probs
}

/// Nucleus truncation of a probability vector.
///
/// Sorts descending and drops every entry whose cumulative mass *before*
/// it already exceeds `top_p`. Survivors are renormalized to sum to 1 and
/// returned as `(token_id, probability)` in descending order. The most
/// probable entry always survives.
#[must_use]
pub fn nucleus(probs: &[f32], top_p: f32) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = probs
        .iter()
        .enumerate()
        .map(|(i, &p)| (i as u32, p))
        .collect();
    // Stable, so equal probabilities keep ascending token order.
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut cumulative = 0.0f32;
    let mut cutoff = indexed.len();
    for (i, &(_, p)) in indexed.iter().enumerate() {
        if i > 0 && (cumulative > top_p || p <= 0.0) {
            cutoff = i;
            break;
        }
        cumulative += p;
    }
    indexed.truncate(cutoff);

    let kept: f32 = indexed.iter().map(|&(_, p)| p).sum();
    if kept > 0.0 {
        for (_, p) in &mut indexed {
            *p /= kept;
        }
    }
    indexed
}

/// Nucleus (top-p) sampling from one logits row, drawing from `rng`.
///
/// Falls back to [`argmax`] when the row carries no finite probability mass.
///
/// # Errors
/// Returns [`Error::InvalidShape`] if `logits` is empty.
pub fn sample_top_p<R: Rng + ?Sized>(
    logits: &[f32],
    temperature: f32,
    top_p: f32,
    rng: &mut R,
) -> Result<u32> {
    if logits.is_empty() {
        return Err(Error::InvalidShape("sampling from empty logits".into()));
    }
    let probs = softmax(logits, temperature);
    let nucleus = nucleus(&probs, top_p);
    if nucleus.first().map_or(true, |&(_, p)| p <= 0.0) {
        return argmax(logits);
    }

    let r: f32 = rng.gen();
    let mut cumul = 0.0f32;
    for &(idx, p) in &nucleus {
        cumul += p;
        if r < cumul {
            return Ok(idx);
        }
    }

    // Rounding left the cumulative sum just under 1.0
    Ok(nucleus[nucleus.len() - 1].0)
}

/// Seeded convenience wrapper around [`sample_top_p`].
///
/// # Errors
/// Returns [`Error::InvalidShape`] if `logits` is empty.
pub fn sample_from_logits(logits: &[f32], temperature: f32, top_p: f32, seed: u64) -> Result<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    sample_top_p(logits, temperature, top_p, &mut rng)
}

/// Derive the draw seed for one `(row, position)` cell of a generation.
///
/// SplitMix64 finalizer over the base seed and the cell coordinates, so a
/// row's randomness never depends on how many other rows share its batch.
#[must_use]
pub fn mix_seed(seed: u64, row: usize, position: usize) -> u64 {
    let mut z = seed
        ^ (row as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (position as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
