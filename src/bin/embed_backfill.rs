use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use recipe_embedder::embedder::bge::{BgeEmbedder, EMBEDDING_DIMENSION, MODEL_NAME};
use recipe_embedder::{
    CheckpointManager, EmbeddingPipeline, PgStore, PipelineConfig, RunOptions, TableName,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "recipe-embedder",
    about = "Backfill recipe embeddings into a pgvector-backed Postgres table"
)]
struct EmbedCli {
    /// Execute writes (default is a dry-run preview)
    #[arg(long, default_value_t = false)]
    execute: bool,

    /// Preview mode: run everything except database writes
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Limit the number of recipes to process
    #[arg(long, env = "RECIPE_EMBED_LIMIT")]
    limit: Option<i64>,

    /// Number of recipes per embedding/persistence batch
    #[arg(long, env = "RECIPE_EMBED_BATCH", default_value_t = 100)]
    batch_size: usize,

    /// Resume from the last saved checkpoint
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Schema containing both tables
    #[arg(long, env = "RECIPE_EMBED_SCHEMA", default_value = "public")]
    schema: String,

    /// Source recipes table
    #[arg(long, env = "RECIPE_EMBED_RECIPES_TABLE", default_value = "recipes")]
    recipes_table: String,

    /// Destination embeddings table
    #[arg(
        long,
        env = "RECIPE_EMBED_TABLE",
        default_value = "recipe_embeddings"
    )]
    embeddings_table: String,

    /// Create the embeddings table automatically if missing
    #[arg(long, env = "RECIPE_EMBED_PREPARE", default_value_t = false)]
    prepare_table: bool,

    /// Checkpoint file overwritten as the run progresses
    #[arg(
        long,
        env = "RECIPE_EMBED_CHECKPOINT",
        default_value = "tmp/embedding-generation-checkpoint.json"
    )]
    checkpoint_file: PathBuf,

    /// JSON report written once at end of run
    #[arg(
        long,
        env = "RECIPE_EMBED_REPORT",
        default_value = "tmp/embedding-generation-report.json"
    )]
    report_file: PathBuf,

    /// Append-only log of failed recipe ids
    #[arg(
        long,
        env = "RECIPE_EMBED_ERROR_LOG",
        default_value = "tmp/embedding-generation-errors.log"
    )]
    error_log: PathBuf,

    /// Save a checkpoint every N batches
    #[arg(long, env = "RECIPE_EMBED_CHECKPOINT_INTERVAL", default_value_t = 10)]
    checkpoint_interval: usize,

    /// Directory for cached model assets
    #[arg(long, env = "RECIPE_EMBED_MODEL_CACHE")]
    model_cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = EmbedCli::parse();
    let dry_run = !cli.execute || cli.dry_run;
    let batch_size = cli.batch_size.max(1);

    println!("Model: {MODEL_NAME}");
    println!("Embedding dimension: {EMBEDDING_DIMENSION}");
    println!("Batch size: {batch_size}");
    if dry_run {
        println!("Mode: dry run (pass --execute to write)");
    }

    let config = PipelineConfig {
        batch_size,
        checkpoint_interval: cli.checkpoint_interval.max(1),
        report_file: cli.report_file.clone(),
        error_log: cli.error_log.clone(),
    };
    let checkpoints = CheckpointManager::new(cli.checkpoint_file.clone());
    let options = RunOptions {
        dry_run,
        limit: cli.limit,
        resume: cli.resume,
    };

    let interrupt = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&interrupt);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received; finishing the current batch before stopping...");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    // Setup runs inside the pipeline so a model or connection failure still
    // leaves a report artifact behind.
    let report = EmbeddingPipeline::bootstrap_and_run(
        checkpoints,
        config,
        options,
        MODEL_NAME,
        EMBEDDING_DIMENSION,
        interrupt,
        || async move {
            // Model load is the slow cold-start step; nothing embeds before
            // it finishes.
            let cache_dir = cli.model_cache_dir.clone();
            let embedder =
                tokio::task::spawn_blocking(move || BgeEmbedder::load(cache_dir, batch_size))
                    .await
                    .context("model loading task panicked")??;

            let recipes = TableName::new(cli.schema.clone(), cli.recipes_table.clone())?;
            let embeddings = TableName::new(cli.schema.clone(), cli.embeddings_table.clone())?;
            let store = PgStore::connect(
                &cli.database_url,
                recipes,
                embeddings,
                MODEL_NAME.to_string(),
                EMBEDDING_DIMENSION,
            )
            .await?;
            if cli.prepare_table {
                store.prepare_table().await?;
            }
            Ok((store, embedder))
        },
    )
    .await?;

    println!("--- Embedding Backfill ---");
    println!("processed: {}", report.stats.processed);
    println!("successful: {}", report.stats.successful);
    println!("failed: {}", report.stats.failed);
    if let Some(formatted) = &report.duration_formatted {
        println!("duration: {formatted}");
    }
    if let Some(rate) = report.recipes_per_minute {
        println!("throughput: {rate:.2} recipes/minute");
    }
    if report.dry_run {
        println!("dry run: no changes were made to the database");
    }
    if report.interrupted {
        println!("interrupted: resume with --execute --resume");
    }

    Ok(())
}
