//! Run statistics and the end-of-run report artifact.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// In-memory counters accumulated over a single run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Rows in the recipes table.
    pub total_recipes: u64,
    /// Rows already present in the embeddings table.
    pub already_embedded: u64,
    /// Backlog size selected for this run.
    pub to_process: u64,
    /// Records that made it through text building and embedding.
    pub processed: u64,
    /// Records persisted (or counted as persisted in dry-run).
    pub successful: u64,
    /// Records that ended the run in a failed state.
    pub failed: u64,
    /// Run start time.
    pub start_time: Option<DateTime<Utc>>,
    /// Run end time.
    pub end_time: Option<DateTime<Utc>>,
}

impl RunStats {
    /// Fresh stats stamped with the current time.
    pub fn begin() -> Self {
        Self {
            start_time: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Stamps the end time.
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Wall-clock duration in seconds, when both timestamps are present.
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

/// Report artifact written exactly once per run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Final counter values.
    #[serde(flatten)]
    pub stats: RunStats,
    /// Model used for every vector in the run.
    pub model_name: String,
    /// Configured vector width.
    pub embedding_dimension: usize,
    /// Records per batch.
    pub batch_size: usize,
    /// Whether persistence was skipped.
    pub dry_run: bool,
    /// Whether the run stopped at a batch boundary on an interrupt signal.
    pub interrupted: bool,
    /// Wall-clock duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Duration rendered as H:MM:SS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_formatted: Option<String>,
    /// Throughput over successful records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipes_per_minute: Option<f64>,
}

impl RunReport {
    /// Derives the report from final stats plus run configuration.
    pub fn new(
        stats: RunStats,
        model_name: String,
        embedding_dimension: usize,
        batch_size: usize,
        dry_run: bool,
        interrupted: bool,
    ) -> Self {
        let duration_seconds = stats.duration_seconds();
        let duration_formatted = duration_seconds.map(format_duration);
        let recipes_per_minute = match duration_seconds {
            Some(secs) if secs > 0.0 && stats.successful > 0 => {
                Some(((stats.successful as f64 / (secs / 60.0)) * 100.0).round() / 100.0)
            }
            _ => None,
        };
        Self {
            stats,
            model_name,
            embedding_dimension,
            batch_size,
            dry_run,
            interrupted,
            duration_seconds,
            duration_formatted,
            recipes_per_minute,
        }
    }

    /// Writes the report as pretty-printed JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("failed to write report {:?}", path))?;
        Ok(())
    }
}

/// Formats a duration in seconds as `H:MM:SS`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
