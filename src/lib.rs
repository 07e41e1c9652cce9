#![warn(missing_docs)]
//! Resumable batch backfill of recipe embeddings into a pgvector store.
//!
//! The pipeline walks recipes lacking an embedding row, derives a canonical
//! text per recipe, embeds batches through a locally-loaded model, and
//! upserts the vectors idempotently so interrupted or repeated runs never
//! duplicate or corrupt work.

pub mod checkpoint;
pub mod embedder;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod store;
pub mod text;

pub use checkpoint::{Checkpoint, CheckpointManager};
pub use embedder::{BgeEmbedder, EmbedError, Embedder};
pub use pipeline::{EmbeddingPipeline, PipelineConfig, RunOptions};
pub use record::{ListField, RecipeRecord};
pub use report::{RunReport, RunStats};
pub use store::{EmbeddingStore, PgStore, StoreStats, TableName};
pub use text::build_embedding_text;
