//! fastembed-backed `BAAI/bge-small-en-v1.5` embedder.
//!
//! The ONNX model and tokenizer assets are fetched into a local cache on
//! first use (~130MB download), then loaded from disk on subsequent runs.
//! Loading happens exactly once per process, before any batch is embedded.

use std::path::PathBuf;

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{l2_normalize, EmbedError, Embedder};

/// HuggingFace identifier of the production embedding model.
pub const MODEL_NAME: &str = "BAAI/bge-small-en-v1.5";

/// Output width of bge-small-en-v1.5.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Locally-loaded bge-small embedder.
pub struct BgeEmbedder {
    model: TextEmbedding,
    batch_size: usize,
}

impl BgeEmbedder {
    /// Loads the model, downloading assets into `cache_dir` when absent.
    ///
    /// `batch_size` caps how many texts are submitted to the ONNX session per
    /// inference call; larger input slices are split internally.
    pub fn load(cache_dir: Option<PathBuf>, batch_size: usize) -> Result<Self> {
        tracing::info!(
            model = MODEL_NAME,
            "loading embedding model (first run downloads assets)"
        );
        let mut options =
            InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(options)
            .context("failed to initialize bge-small embedding model")?;

        // Fail fast on model drift instead of deferring to the first batch.
        let probe = model
            .embed(vec!["dimension probe"], None)
            .context("embedding probe failed")?;
        let probe_dim = probe.first().map_or(0, Vec::len);
        anyhow::ensure!(
            probe_dim == EMBEDDING_DIMENSION,
            "model probe returned dimension {probe_dim}, expected {EMBEDDING_DIMENSION}"
        );

        tracing::info!(
            model = MODEL_NAME,
            dimension = EMBEDDING_DIMENSION,
            "embedding model ready"
        );
        Ok(Self {
            model,
            batch_size: batch_size.max(1),
        })
    }
}

impl Embedder for BgeEmbedder {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|err| EmbedError::Inference(err.to_string()))?;
        if raw.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                inputs: texts.len(),
                outputs: raw.len(),
            });
        }
        let mut vectors = Vec::with_capacity(raw.len());
        for embedding in raw {
            if embedding.len() != EMBEDDING_DIMENSION {
                return Err(EmbedError::DimensionMismatch {
                    expected: EMBEDDING_DIMENSION,
                    actual: embedding.len(),
                });
            }
            vectors.push(l2_normalize(&embedding));
        }
        Ok(vectors)
    }
}
