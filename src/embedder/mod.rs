//! Embedding model seam and shared vector helpers.

use thiserror::Error;

pub mod bge;

pub use bge::BgeEmbedder;

/// Failures surfaced while embedding a batch of texts.
///
/// Every variant aborts the current batch, never the whole run; the
/// orchestrator converts them into per-record failure entries and moves on.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The model emitted a vector whose width differs from the configured dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured output width.
        expected: usize,
        /// Width actually returned by the model.
        actual: usize,
    },
    /// The model returned a different number of vectors than inputs.
    #[error("embedding count mismatch: {inputs} inputs produced {outputs} vectors")]
    CountMismatch {
        /// Texts submitted.
        inputs: usize,
        /// Vectors returned.
        outputs: usize,
    },
    /// Inference-level failure reported by the model runtime.
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

/// A loaded embedding model.
///
/// Implementations are constructed once at startup and reused for the run's
/// lifetime; `embed_batch` is order-preserving and returns L2-normalized
/// vectors so cosine similarity reduces to a dot product.
pub trait Embedder: Send + Sync {
    /// Model identifier persisted alongside each embedding row.
    fn model_name(&self) -> &str;

    /// Fixed output width of the model.
    fn dimension(&self) -> usize;

    /// Embeds a batch of texts, one unit-norm vector per input.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Scales a vector to unit L2 norm. Zero vectors are returned unchanged.
pub fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_norm() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert_eq!(normalized, vec![0.6, 0.8]);
        let norm: f32 = normalized.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_unchanged() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn dimension_mismatch_message_names_both_widths() {
        let err = EmbedError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: expected 384, got 768"
        );
    }
}
