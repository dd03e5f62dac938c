use anyhow::{Context, Result};
use serde::Serialize;

pub mod fvecs;
pub mod generator;

pub use fvecs::read_fvecs;
pub use generator::{normalize, QueryBatch, VectorPool};

use crate::error::SweepError;

/// One (nq, topK) pair under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Configuration {
    pub batch_size: usize,
    pub top_k: usize,
}

impl Configuration {
    pub fn new(batch_size: usize, top_k: usize) -> Self {
        Self { batch_size, top_k }
    }
}

/// Ordered cross product of batch sizes and topK values.
///
/// Iteration is outer over batch sizes and inner over topK, both in input
/// order. Report row order depends on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationMatrix {
    batch_sizes: Vec<usize>,
    top_ks: Vec<usize>,
}

impl ConfigurationMatrix {
    /// Build a matrix, dropping repeated values while keeping first occurrences.
    pub fn new(batch_sizes: &[usize], top_ks: &[usize]) -> Result<Self, SweepError> {
        let batch_sizes = dedup_preserving_order(batch_sizes);
        let top_ks = dedup_preserving_order(top_ks);

        if batch_sizes.is_empty() || top_ks.is_empty() {
            return Err(SweepError::EmptyMatrix);
        }
        if batch_sizes.contains(&0) {
            return Err(SweepError::invalid("batch size (nq) must be positive"));
        }
        if top_ks.contains(&0) {
            return Err(SweepError::invalid("topK must be positive"));
        }

        Ok(Self {
            batch_sizes,
            top_ks,
        })
    }

    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    pub fn top_ks(&self) -> &[usize] {
        &self.top_ks
    }

    pub fn len(&self) -> usize {
        self.batch_sizes.len() * self.top_ks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest batch any configuration will slice from the pool.
    pub fn max_batch_size(&self) -> usize {
        self.batch_sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Configuration> + '_ {
        self.batch_sizes.iter().flat_map(move |&batch_size| {
            self.top_ks
                .iter()
                .map(move |&top_k| Configuration::new(batch_size, top_k))
        })
    }
}

fn dedup_preserving_order(values: &[usize]) -> Vec<usize> {
    let mut seen = Vec::with_capacity(values.len());
    for &value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

/// Parse a comma-separated list such as `"1, 10, ,30"`.
///
/// Items are trimmed, empty items are skipped and repeated values keep only
/// their first occurrence.
pub fn parse_list(raw: &str) -> Result<Vec<usize>> {
    let mut values = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let value: usize = item
            .parse()
            .with_context(|| format!("invalid list item '{item}' in '{raw}'"))?;
        values.push(value);
    }
    Ok(dedup_preserving_order(&values))
}
