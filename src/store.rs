//! Postgres/pgvector persistence: backlog queries and idempotent upserts.
//!
//! The backlog query is a left-anti-join of recipes against embeddings on
//! recipe id, ordered ascending so runs are reproducible and a checkpoint
//! cursor plus `id > cursor` reconstructs exactly the unseen remainder.
//! Upserts run one transaction per batch: all-or-nothing, conflict on
//! recipe_id overwriting everything except `created_at`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::record::{ListField, RecipeRecord};

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Returns the raw schema string.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the raw table string.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Row counts backing the pre-run statistics banner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Rows in the recipes table.
    pub total_recipes: u64,
    /// Rows in the embeddings table.
    pub already_embedded: u64,
}

/// Transactional store surface the orchestrator depends on.
#[async_trait]
pub trait EmbeddingStore: Send {
    /// Counts recipes and existing embedding rows.
    async fn stats(&self) -> Result<StoreStats>;

    /// Fetches recipes lacking an embedding row, ordered by id ascending.
    ///
    /// `resume_after` restricts the result to `id > resume_after`; `limit`
    /// truncates after ordering. Read-only.
    async fn fetch_backlog(
        &self,
        limit: Option<i64>,
        resume_after: Option<&str>,
    ) -> Result<Vec<RecipeRecord>>;

    /// Upserts one embedding row per id inside a single transaction.
    ///
    /// The three slices must be equal length. On conflict on recipe_id the
    /// vector, text, model name, and updated_at are overwritten while
    /// created_at is preserved. Any error rolls the whole batch back.
    async fn upsert_embeddings(
        &mut self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
    ) -> Result<u64>;
}

/// pgvector-backed Postgres store.
pub struct PgStore {
    client: tokio_postgres::Client,
    recipes: TableName,
    embeddings: TableName,
    model_name: String,
    dimension: usize,
}

impl PgStore {
    /// Connects to Postgres and spawns the connection driver task.
    ///
    /// The pgvector extension is probed at connect time; absence is a
    /// warning, not an error, because dry runs never touch vector columns.
    pub async fn connect(
        database_url: &str,
        recipes: TableName,
        embeddings: TableName,
        model_name: String,
        dimension: usize,
    ) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("failed to connect to Postgres")?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });

        let store = Self {
            client,
            recipes,
            embeddings,
            model_name,
            dimension,
        };
        store.check_vector_extension().await?;
        Ok(store)
    }

    async fn check_vector_extension(&self) -> Result<()> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = 'vector')",
                &[],
            )
            .await
            .context("failed to probe for pgvector extension")?;
        let present: bool = row.get(0);
        if present {
            tracing::debug!("pgvector extension present");
        } else {
            tracing::warn!("pgvector extension not found; vector writes may fail");
        }
        Ok(())
    }

    /// Creates the embeddings table when missing.
    pub async fn prepare_table(&self) -> Result<()> {
        anyhow::ensure!(self.dimension > 0, "embedding dimension must be positive");
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                recipe_id TEXT NOT NULL UNIQUE,
                embedding VECTOR({}) NOT NULL,
                embedding_text TEXT NOT NULL,
                model_name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            self.embeddings.qualified(),
            self.dimension
        );
        self.client
            .execute(&ddl, &[])
            .await
            .context("failed to create embeddings table")?;
        Ok(())
    }

    fn record_from_row(row: &Row) -> RecipeRecord {
        RecipeRecord {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            cuisine: row.get("cuisine"),
            tags: row
                .get::<_, Option<String>>("tags")
                .map(ListField::Serialized),
            ingredients: row
                .get::<_, Option<String>>("ingredients")
                .map(ListField::Serialized),
            difficulty: row.get("difficulty"),
        }
    }
}

#[async_trait]
impl EmbeddingStore for PgStore {
    async fn stats(&self) -> Result<StoreStats> {
        let total = self
            .client
            .query_one(
                &format!("SELECT COUNT(*) FROM {}", self.recipes.qualified()),
                &[],
            )
            .await
            .context("failed to count recipes")?;
        let embedded = self
            .client
            .query_one(
                &format!("SELECT COUNT(*) FROM {}", self.embeddings.qualified()),
                &[],
            )
            .await
            .context("failed to count embeddings")?;
        Ok(StoreStats {
            total_recipes: total.get::<_, i64>(0).max(0) as u64,
            already_embedded: embedded.get::<_, i64>(0).max(0) as u64,
        })
    }

    async fn fetch_backlog(
        &self,
        limit: Option<i64>,
        resume_after: Option<&str>,
    ) -> Result<Vec<RecipeRecord>> {
        let mut sql = format!(
            "SELECT r.id, r.name, r.description, r.cuisine, r.tags, r.ingredients, r.difficulty \
             FROM {} r LEFT JOIN {} e ON r.id = e.recipe_id \
             WHERE e.recipe_id IS NULL",
            self.recipes.qualified(),
            self.embeddings.qualified()
        );
        let cursor = resume_after.map(str::to_owned);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(cursor) = cursor.as_ref() {
            sql.push_str(&format!(" AND r.id > ${}", params.len() + 1));
            params.push(cursor);
        }
        sql.push_str(" ORDER BY r.id ASC");
        if let Some(limit) = limit.as_ref() {
            sql.push_str(&format!(" LIMIT ${}", params.len() + 1));
            params.push(limit);
        }

        let rows = self
            .client
            .query(&sql, &params)
            .await
            .context("failed to fetch backlog")?;
        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn upsert_embeddings(
        &mut self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
    ) -> Result<u64> {
        anyhow::ensure!(
            ids.len() == vectors.len() && vectors.len() == texts.len(),
            "mismatched upsert arrays: {} ids, {} vectors, {} texts",
            ids.len(),
            vectors.len(),
            texts.len()
        );
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "INSERT INTO {} \
                (recipe_id, embedding, embedding_text, model_name, created_at, updated_at) \
                VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (recipe_id) DO UPDATE SET \
                embedding = EXCLUDED.embedding, \
                embedding_text = EXCLUDED.embedding_text, \
                model_name = EXCLUDED.model_name, \
                updated_at = EXCLUDED.updated_at",
            self.embeddings.qualified()
        );
        let now = Utc::now();
        let transaction = self.client.transaction().await?;
        let statement = transaction.prepare(&sql).await?;
        for ((id, vector), text) in ids.iter().zip(vectors).zip(texts) {
            let embedding = Vector::from(vector.clone());
            transaction
                .execute(&statement, &[id, &embedding, text, &self.model_name, &now, &now])
                .await
                .with_context(|| format!("failed to upsert embedding for recipe {id}"))?;
        }
        transaction.commit().await?;
        Ok(ids.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_rejects_blank_parts() {
        assert!(TableName::new("", "recipes").is_err());
        assert!(TableName::new("public", "  ").is_err());
    }

    #[test]
    fn qualified_quotes_identifiers() {
        let table = TableName::new("public", "recipe_embeddings").unwrap();
        assert_eq!(table.qualified(), "\"public\".\"recipe_embeddings\"");
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
