use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, in source-image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector (typically 512-dimensional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Zero-norm or
    /// dimension-mismatched inputs yield 0.0 rather than an error: a
    /// degenerate embedding is a normal input, not an anomaly.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            tracing::debug!(
                left = self.values.len(),
                right = other.values.len(),
                "embedding dimension mismatch, similarity is 0"
            );
            return 0.0;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// Cosine similarity over optional embeddings.
///
/// "No embedding" is a common, expected input (a face the extractor could
/// not embed, an identity enrolled without one), so absence maps to 0.0
/// instead of raising.
pub fn compare(a: Option<&Embedding>, b: Option<&Embedding>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => a.similarity(b),
        _ => 0.0,
    }
}

/// One face found in a submitted image. Ephemeral: lives only for the
/// duration of one matching task.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub embedding: Embedding,
    pub bbox: BoundingBox,
}

/// A known identity from the reference population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceIdentity {
    pub id: String,
    pub display_name: String,
    pub embedding: Embedding,
}

/// Best match for one detected face against the reference population.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub identity: ReferenceIdentity,
    /// Cosine similarity of the best match [-1, 1].
    pub similarity: f32,
    pub bbox: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_self_nonzero() {
        let v = Embedding::new(vec![0.3, -1.2, 4.5, 0.01]);
        assert!((v.similarity(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn similarity_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn compare_absent_is_zero() {
        let v = Embedding::new(vec![1.0, 2.0]);
        assert_eq!(compare(None, Some(&v)), 0.0);
        assert_eq!(compare(Some(&v), None), 0.0);
        assert_eq!(compare(None, None), 0.0);
        assert!((compare(Some(&v), Some(&v)) - 1.0).abs() < 1e-6);
    }
}
