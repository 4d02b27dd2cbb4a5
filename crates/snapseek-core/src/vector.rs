//! Embedding vectors and similarity math
//!
//! Every vector in the system is L2-normalized so that the dot product of
//! two vectors equals their cosine similarity.

use crate::{Result, SnapError};
use serde::{Deserialize, Serialize};

/// Fixed-dimension embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap raw values as-is
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Wrap raw model output, scaling it to unit length
    pub fn normalized(values: Vec<f32>) -> Result<Self> {
        let vector = Self(values);
        vector.ensure_finite()?;

        let norm = vector.norm();
        if norm == 0.0 {
            return Err(SnapError::Validation(
                "cannot normalize a zero-length embedding".to_string(),
            ));
        }

        Ok(Self(vector.0.into_iter().map(|v| v / norm).collect()))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// L2 norm
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Dot product. Equals cosine similarity for unit vectors.
    pub fn dot(&self, other: &EmbeddingVector) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    /// Cosine similarity, independent of normalization. Returns 0.0 when
    /// either vector has zero magnitude.
    pub fn cosine(&self, other: &EmbeddingVector) -> f32 {
        let norm_a = self.norm();
        let norm_b = other.norm();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        self.dot(other) / (norm_a * norm_b)
    }

    /// Reject NaN and infinite components
    pub fn ensure_finite(&self) -> Result<()> {
        if self.0.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(SnapError::Validation(
                "embedding contains non-finite values".to_string(),
            ))
        }
    }

    /// Reject vectors whose length differs from `expected`
    pub fn ensure_dimension(&self, expected: usize) -> Result<()> {
        if self.dimension() == expected {
            Ok(())
        } else {
            Err(SnapError::Validation(format!(
                "embedding dimension mismatch: expected {expected}, got {}",
                self.dimension()
            )))
        }
    }

    /// Little-endian `f32` bytes, the on-disk layout of stored embeddings
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Decode the layout written by [`EmbeddingVector::to_le_bytes`]
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(SnapError::Database(format!(
                "embedding blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        Ok(Self(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ))
    }
}

impl From<EmbeddingVector> for Vec<f32> {
    fn from(vector: EmbeddingVector) -> Self {
        vector.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_normalized_has_unit_norm() {
        let v = EmbeddingVector::normalized(vec![3.0, 4.0]).unwrap();
        assert!((v.norm() - 1.0).abs() < EPS);
        assert!((v.as_slice()[0] - 0.6).abs() < EPS);
        assert!((v.as_slice()[1] - 0.8).abs() < EPS);
    }

    #[test]
    fn test_normalize_rejects_zero_and_nan() {
        assert!(EmbeddingVector::normalized(vec![0.0, 0.0]).is_err());
        assert!(EmbeddingVector::normalized(vec![f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_self_similarity_is_one() {
        let v = EmbeddingVector::normalized(vec![0.2, -0.7, 0.4]).unwrap();
        assert!((v.dot(&v) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_dimension_check() {
        let v = EmbeddingVector::new(vec![1.0, 0.0, 0.0]);
        assert!(v.ensure_dimension(3).is_ok());
        assert!(matches!(
            v.ensure_dimension(4),
            Err(SnapError::Validation(_))
        ));
    }

    #[test]
    fn test_byte_layout() {
        let v = EmbeddingVector::new(vec![0.5, -1.25, 3.0]);
        let bytes = v.to_le_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(EmbeddingVector::from_le_bytes(&bytes).unwrap(), v);
        assert!(EmbeddingVector::from_le_bytes(&bytes[..5]).is_err());
    }

    proptest! {
        #[test]
        fn prop_dot_equals_cosine_for_unit_vectors(
            a in prop::collection::vec(-10.0f32..10.0, 8),
            b in prop::collection::vec(-10.0f32..10.0, 8),
        ) {
            prop_assume!(a.iter().any(|v| v.abs() > 1e-3));
            prop_assume!(b.iter().any(|v| v.abs() > 1e-3));

            let a = EmbeddingVector::normalized(a).unwrap();
            let b = EmbeddingVector::normalized(b).unwrap();

            prop_assert!((a.dot(&b) - a.cosine(&b)).abs() < 1e-4);
            prop_assert!((a.dot(&a) - 1.0).abs() < 1e-4);
        }
    }
}
