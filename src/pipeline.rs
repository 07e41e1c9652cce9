//! Run orchestration: the sequential batch loop tying together text
//! building, embedding, persistence, checkpointing, and reporting.
//!
//! Failures inside a batch are converted into stats and error-log entries and
//! never unwind past the loop; setup failures flush a report and then
//! propagate. Every run, however it ends, produces exactly one report
//! artifact.

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::checkpoint::CheckpointManager;
use crate::embedder::Embedder;
use crate::record::RecipeRecord;
use crate::report::{RunReport, RunStats};
use crate::store::EmbeddingStore;
use crate::text::build_embedding_text;

/// Reason recorded for records whose derived text is empty.
const EMPTY_TEXT_REASON: &str = "empty embedding text";

/// Fixed knobs for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records per embedding/persistence batch.
    pub batch_size: usize,
    /// Save a checkpoint every N batches.
    pub checkpoint_interval: usize,
    /// Report artifact destination.
    pub report_file: PathBuf,
    /// Append-only failed-record log destination.
    pub error_log: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            checkpoint_interval: 10,
            report_file: PathBuf::from("tmp/embedding-generation-report.json"),
            error_log: PathBuf::from("tmp/embedding-generation-errors.log"),
        }
    }
}

/// Options selected per invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip persistence while keeping every other step identical.
    pub dry_run: bool,
    /// Truncate the backlog after ordering.
    pub limit: Option<i64>,
    /// Resume past the saved checkpoint cursor.
    pub resume: bool,
}

/// Composes store, embedder, and checkpoints into the batch loop.
pub struct EmbeddingPipeline<S, E> {
    store: S,
    embedder: E,
    checkpoints: CheckpointManager,
    config: PipelineConfig,
    interrupted: Arc<AtomicBool>,
}

impl<S: EmbeddingStore, E: Embedder> EmbeddingPipeline<S, E> {
    /// Builds a pipeline over an already-connected store and loaded model.
    pub fn new(
        store: S,
        embedder: E,
        checkpoints: CheckpointManager,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            checkpoints,
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag observed at batch boundaries; set it to request a
    /// graceful stop. The in-flight batch always finishes first.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Runs setup and then the full backfill, writing the report artifact on
    /// every exit path.
    ///
    /// Model loading and store connection happen through `setup` inside the
    /// run, so a failure there still finishes the stats and flushes a report
    /// before the error propagates. `model_name` and `dimension` fill the
    /// report when setup dies before an embedder exists.
    pub async fn bootstrap_and_run<F, Fut>(
        checkpoints: CheckpointManager,
        config: PipelineConfig,
        options: RunOptions,
        model_name: &str,
        dimension: usize,
        interrupt: Arc<AtomicBool>,
        setup: F,
    ) -> Result<RunReport>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(S, E)>>,
    {
        let stats = RunStats::begin();
        match setup().await {
            Ok((store, embedder)) => {
                let mut pipeline = Self::new(store, embedder, checkpoints, config);
                pipeline.interrupted = interrupt;
                pipeline.run_with_stats(options, stats).await
            }
            Err(err) => {
                let mut stats = stats;
                stats.finish();
                let report = RunReport::new(
                    stats,
                    model_name.to_string(),
                    dimension,
                    config.batch_size,
                    options.dry_run,
                    false,
                );
                if let Err(write_err) = report.write(&config.report_file) {
                    tracing::warn!(
                        error = %write_err,
                        path = %config.report_file.display(),
                        "failed to write run report"
                    );
                }
                Err(err)
            }
        }
    }

    /// Runs the full backfill and returns the report that was persisted.
    ///
    /// The report is written on every exit path, including fatal errors,
    /// before the error is propagated.
    pub async fn run(&mut self, options: RunOptions) -> Result<RunReport> {
        self.run_with_stats(options, RunStats::begin()).await
    }

    async fn run_with_stats(
        &mut self,
        options: RunOptions,
        mut stats: RunStats,
    ) -> Result<RunReport> {
        let mut failures: Vec<(String, String)> = Vec::new();
        let outcome = self.execute(options, &mut stats, &mut failures).await;
        stats.finish();

        if !failures.is_empty() {
            tracing::warn!(count = failures.len(), "recipes failed this run");
            if let Err(err) = append_error_log(&self.config.error_log, &failures) {
                tracing::warn!(error = %err, "failed to append error log");
            }
        }

        let interrupted = matches!(outcome, Ok(true));
        let report = RunReport::new(
            stats,
            self.embedder.model_name().to_string(),
            self.embedder.dimension(),
            self.config.batch_size,
            options.dry_run,
            interrupted,
        );
        if let Err(err) = report.write(&self.config.report_file) {
            tracing::warn!(
                error = %err,
                path = %self.config.report_file.display(),
                "failed to write run report"
            );
        } else {
            tracing::info!(path = %self.config.report_file.display(), "report saved");
        }
        if interrupted {
            tracing::warn!("run interrupted; resume with --execute --resume");
        }

        outcome.map(|_| report)
    }

    /// Returns `Ok(true)` when the run stopped on the interrupt flag.
    async fn execute(
        &mut self,
        options: RunOptions,
        stats: &mut RunStats,
        failures: &mut Vec<(String, String)>,
    ) -> Result<bool> {
        let store_stats = self
            .store
            .stats()
            .await
            .context("failed to gather embedding statistics")?;
        stats.total_recipes = store_stats.total_recipes;
        stats.already_embedded = store_stats.already_embedded;
        tracing::info!(
            total = store_stats.total_recipes,
            already_embedded = store_stats.already_embedded,
            remaining = store_stats.total_recipes - store_stats.already_embedded.min(store_stats.total_recipes),
            "embedding backlog statistics"
        );
        if options.dry_run {
            tracing::info!("dry-run mode: no database changes will be made");
        }

        let resume_after = if options.resume {
            self.checkpoints.load().map(|checkpoint| {
                tracing::info!(
                    last_recipe_id = %checkpoint.last_recipe_id,
                    "resuming past checkpoint cursor"
                );
                checkpoint.last_recipe_id
            })
        } else {
            None
        };

        // Postgres rejects a negative LIMIT outright.
        let limit = options.limit.map(|n| n.max(0));
        let backlog = self
            .store
            .fetch_backlog(limit, resume_after.as_deref())
            .await
            .context("failed to fetch backlog")?;
        if backlog.is_empty() {
            tracing::info!("all recipes already have embeddings");
            return Ok(false);
        }
        stats.to_process = backlog.len() as u64;
        tracing::info!(
            to_process = backlog.len(),
            batch_size = self.config.batch_size,
            "starting batch loop"
        );

        let batch_size = self.config.batch_size.max(1);
        for (batch_index, batch) in backlog.chunks(batch_size).enumerate() {
            if self.interrupted.load(Ordering::Relaxed) {
                tracing::warn!(batch = batch_index, "interrupt observed at batch boundary");
                return Ok(true);
            }
            self.process_batch(batch_index, batch, options.dry_run, stats, failures)
                .await;
        }
        Ok(false)
    }

    /// Processes one batch; errors are absorbed into stats and `failures`.
    async fn process_batch(
        &mut self,
        batch_index: usize,
        batch: &[RecipeRecord],
        dry_run: bool,
        stats: &mut RunStats,
        failures: &mut Vec<(String, String)>,
    ) {
        let mut ids: Vec<String> = Vec::with_capacity(batch.len());
        let mut texts: Vec<String> = Vec::with_capacity(batch.len());
        for recipe in batch {
            let text = build_embedding_text(recipe);
            if text.is_empty() {
                tracing::debug!(recipe_id = %recipe.id, "skipping recipe with empty text");
                failures.push((recipe.id.clone(), EMPTY_TEXT_REASON.to_string()));
                stats.failed += 1;
                continue;
            }
            ids.push(recipe.id.clone());
            texts.push(text);
        }
        if ids.is_empty() {
            // Nothing survived text building; no model or store call.
            return;
        }

        match self.embed_and_persist(&ids, &texts, dry_run).await {
            Ok(written) => {
                stats.successful += written;
                stats.processed += ids.len() as u64;
                if !dry_run
                    && written > 0
                    && batch_index % self.config.checkpoint_interval.max(1) == 0
                {
                    if let Some(last_id) = ids.last() {
                        self.checkpoints.save(last_id, stats.successful);
                    }
                }
            }
            Err(err) => {
                tracing::error!(
                    batch = batch_index,
                    records = ids.len(),
                    error = %err,
                    "batch processing error"
                );
                stats.failed += ids.len() as u64;
                let reason = err.to_string();
                failures.extend(ids.into_iter().map(|id| (id, reason.clone())));
            }
        }
    }

    async fn embed_and_persist(
        &mut self,
        ids: &[String],
        texts: &[String],
        dry_run: bool,
    ) -> Result<u64> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&inputs)?;
        if dry_run {
            return Ok(ids.len() as u64);
        }
        self.store.upsert_embeddings(ids, &vectors, texts).await
    }
}

/// Appends failed (id, reason) pairs under a dated header block.
fn append_error_log(path: &Path, failures: &[(String, String)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open error log {:?}", path))?;
    writeln!(file)?;
    writeln!(file)?;
    writeln!(file, "{}", "=".repeat(60))?;
    writeln!(file, "Failed recipes ({}):", Utc::now().to_rfc3339())?;
    writeln!(file, "{}", "=".repeat(60))?;
    for (id, reason) in failures {
        writeln!(file, "{id}: {reason}")?;
    }
    Ok(())
}
