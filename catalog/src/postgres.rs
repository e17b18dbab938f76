//! A [`Catalog`] backed by Postgres, using batched multi-row
//! `INSERT ... ON CONFLICT DO UPDATE` statements built with
//! [`sqlx::QueryBuilder`], since `sqlx` has no `executemany` equivalent.

use observability_deps::tracing::info;
use search_types::{clean_text, ConfigKey, InvertedIndexRow, MetadataRow, RankRow};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::QueryBuilder;

use crate::{Catalog, CatalogError};

/// `sqlx`'s Postgres bind-parameter limit is 65535; a handful of columns per
/// row keeps every batch this crate sends well under that regardless of the
/// constants in [`crate::REDUCE_UPSERT_BATCH`] et al.
const BIND_LIMIT: usize = 65_535;

/// [`Catalog`] implementation backed by a real Postgres database.
#[derive(Debug)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Connect to `dsn` with a small pool; this store is only ever touched by
    /// the small number of controller/worker connections in one run.
    pub async fn connect(dsn: &str) -> Result<Self, CatalogError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| CatalogError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the four tables from spec §6 if they do not already exist.
    pub async fn init_schema(&self) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inverted_index (
                term     TEXT PRIMARY KEY,
                df       BIGINT NOT NULL,
                postings JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pagerank (
                doc_id TEXT PRIMARY KEY,
                score  DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                doc_id TEXT PRIMARY KEY,
                length BIGINT NOT NULL,
                text   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS config (
                key_hash TEXT PRIMARY KEY,
                value    DOUBLE PRECISION NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::Query(e.to_string()))?;

        info!("catalog schema ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Catalog for PostgresCatalog {
    async fn upsert_index_rows(&self, rows: &[InvertedIndexRow]) -> Result<(), CatalogError> {
        if rows.is_empty() {
            return Ok(());
        }
        // 3 bound params per row.
        for chunk in rows.chunks(BIND_LIMIT / 3) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO inverted_index (term, df, postings) ",
            );
            qb.push_values(chunk, |mut b, row| {
                let postings = serde_json::to_value(&row.postings).unwrap_or_default();
                b.push_bind(&row.term).push_bind(row.df).push_bind(postings);
            });
            qb.push(
                " ON CONFLICT (term) DO UPDATE SET df = EXCLUDED.df, postings = EXCLUDED.postings",
            );
            qb.build()
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::Query(e.to_string()))?;
        }
        Ok(())
    }

    async fn upsert_rank_rows(&self, rows: &[RankRow]) -> Result<(), CatalogError> {
        if rows.is_empty() {
            return Ok(());
        }
        for chunk in rows.chunks(BIND_LIMIT / 2) {
            let mut qb = QueryBuilder::new("INSERT INTO pagerank (doc_id, score) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.doc_id).push_bind(row.score);
            });
            qb.push(" ON CONFLICT (doc_id) DO UPDATE SET score = EXCLUDED.score");
            qb.build()
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::Query(e.to_string()))?;
        }
        Ok(())
    }

    async fn upsert_metadata_rows(&self, rows: &[MetadataRow]) -> Result<(), CatalogError> {
        if rows.is_empty() {
            return Ok(());
        }
        for chunk in rows.chunks(BIND_LIMIT / 3) {
            let mut qb = QueryBuilder::new("INSERT INTO metadata (doc_id, length, text) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.doc_id)
                    .push_bind(row.length)
                    .push_bind(clean_text(&row.text));
            });
            qb.push(
                " ON CONFLICT (doc_id) DO UPDATE SET length = EXCLUDED.length, text = EXCLUDED.text",
            );
            qb.build()
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::Query(e.to_string()))?;
        }
        Ok(())
    }

    async fn upsert_config(&self, key: ConfigKey, value: f64) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO config (key_hash, value) VALUES ($1, $2) \
             ON CONFLICT (key_hash) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_index_row(&self, term: &str) -> Result<Option<InvertedIndexRow>, CatalogError> {
        let row: Option<(String, i64, serde_json::Value)> =
            sqlx::query_as("SELECT term, df, postings FROM inverted_index WHERE term = $1")
                .bind(term)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(row.map(|(term, df, postings)| InvertedIndexRow {
            term,
            df,
            postings: serde_json::from_value(postings).unwrap_or_default(),
        }))
    }

    async fn index_row_count(&self) -> Result<usize, CatalogError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM inverted_index")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(count as usize)
    }

    async fn get_rank(&self, doc_id: &str) -> Result<Option<f64>, CatalogError> {
        let row: Option<(f64,)> = sqlx::query_as("SELECT score FROM pagerank WHERE doc_id = $1")
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(row.map(|(score,)| score))
    }

    async fn get_config(&self, key: ConfigKey) -> Result<Option<f64>, CatalogError> {
        let row: Option<(f64,)> = sqlx::query_as("SELECT value FROM config WHERE key_hash = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(row.map(|(v,)| v))
    }

    async fn truncate_index(&self) -> Result<(), CatalogError> {
        sqlx::query("TRUNCATE TABLE inverted_index")
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(())
    }

    async fn truncate_ranks(&self) -> Result<(), CatalogError> {
        sqlx::query("TRUNCATE TABLE pagerank")
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(())
    }

    async fn truncate_metadata(&self) -> Result<(), CatalogError> {
        sqlx::query("TRUNCATE TABLE metadata")
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(())
    }
}

// Integration tests against a real Postgres instance live in `tests/` and are
// gated on the `DATABASE_URL` environment variable, following the same
// pattern the teacher workspace uses for its own sqlx-backed catalog tests.
