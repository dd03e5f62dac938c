use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::error::SweepError;

/// Query vectors shared read-only by every worker of one run.
pub type QueryBatch = Arc<[Vec<f32>]>;

/// Pre-generated pool of query vectors. Immutable once built.
#[derive(Debug, Clone)]
pub struct VectorPool {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl VectorPool {
    /// Generate `count` L2-normalized vectors with components drawn uniformly from [0, 1).
    pub fn generate<R: Rng + ?Sized>(count: usize, dimension: usize, rng: &mut R) -> Self {
        let vectors = (0..count)
            .map(|_| {
                let mut vector: Vec<f32> = (0..dimension).map(|_| rng.gen::<f32>()).collect();
                normalize(&mut vector);
                vector
            })
            .collect();

        Self { vectors, dimension }
    }

    pub fn seeded(count: usize, dimension: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::generate(count, dimension, &mut rng)
    }

    pub fn from_entropy(count: usize, dimension: usize) -> Self {
        let mut rng = StdRng::from_entropy();
        Self::generate(count, dimension, &mut rng)
    }

    /// Wrap existing vectors (e.g. read from an fvecs file). Every vector must
    /// have `dimension` components.
    pub fn from_vectors(vectors: Vec<Vec<f32>>, dimension: usize) -> Result<Self, SweepError> {
        if let Some((index, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dimension)
        {
            return Err(SweepError::DimensionMismatch {
                index,
                expected: dimension,
                actual: vector.len(),
            });
        }
        Ok(Self { vectors, dimension })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// First `n` vectors of the pool.
    pub fn slice(&self, n: usize) -> Result<&[Vec<f32>], SweepError> {
        self.vectors.get(..n).ok_or(SweepError::PoolTooSmall {
            required: n,
            available: self.vectors.len(),
        })
    }

    /// Owned, shareable copy of the first `n` vectors.
    pub fn query_batch(&self, n: usize) -> Result<QueryBatch, SweepError> {
        Ok(Arc::from(self.slice(n)?.to_vec()))
    }

    /// Fail unless the pool can serve a batch of `required` vectors.
    pub fn ensure_capacity(&self, required: usize) -> Result<(), SweepError> {
        self.slice(required).map(|_| ())
    }
}

/// Divide every component by the vector's Euclidean norm.
///
/// A zero vector has no direction and is left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn generated_vectors_are_unit_length() {
        let pool = VectorPool::seeded(64, 16, 7);
        assert_eq!(pool.len(), 64);
        assert_eq!(pool.dimension(), 16);
        for v in pool.slice(64).unwrap() {
            assert_eq!(v.len(), 16);
            assert!((l2(v) - 1.0).abs() < 1e-4);
            assert!(v.iter().all(|x| *x >= 0.0));
        }
    }

    #[test]
    fn same_seed_same_pool() {
        let a = VectorPool::seeded(4, 8, 42);
        let b = VectorPool::seeded(4, 8, 42);
        assert_eq!(a.slice(4).unwrap(), b.slice(4).unwrap());
    }

    #[test]
    fn zero_vector_survives_normalization() {
        let mut v = vec![0.0f32; 4];
        normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn normalize_scales_to_unit_norm() {
        let mut v = vec![3.0f32, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn slice_past_end_is_pool_too_small() {
        let pool = VectorPool::seeded(5, 4, 1);
        assert_eq!(pool.slice(5).unwrap().len(), 5);
        match pool.slice(10) {
            Err(SweepError::PoolTooSmall {
                required,
                available,
            }) => {
                assert_eq!(required, 10);
                assert_eq!(available, 5);
            }
            other => panic!("expected PoolTooSmall, got {other:?}"),
        }
    }

    #[test]
    fn query_batch_is_a_prefix() {
        let pool = VectorPool::seeded(10, 3, 9);
        let batch = pool.query_batch(3).unwrap();
        assert_eq!(&batch[..], pool.slice(3).unwrap());
    }

    #[test]
    fn from_vectors_checks_dimension() {
        let err = VectorPool::from_vectors(vec![vec![1.0, 0.0], vec![1.0]], 2).unwrap_err();
        assert!(matches!(
            err,
            SweepError::DimensionMismatch {
                index: 1,
                expected: 2,
                actual: 1
            }
        ));
    }
}
