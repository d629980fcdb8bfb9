//! [`QuoteStore`] на PostgreSQL через `sqlx`.

use async_trait::async_trait;
use quote_common::Quote;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use super::QuoteStore;
use crate::error::StorageError;

/// Котировки в таблице `quotes`; id берутся из её ключа `BIGSERIAL`.
#[derive(Debug, Clone)]
pub struct PgQuoteStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct QuoteRow {
    quote_id: i64,
    text: String,
    author: String,
}

impl From<QuoteRow> for Quote {
    fn from(row: QuoteRow) -> Self {
        Self { id: row.quote_id, text: row.text, author: row.author }
    }
}

impl PgQuoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Открывает пул соединений к `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Применяет встроенные миграции схемы.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl QuoteStore for PgQuoteStore {
    async fn insert(&self, text: &str, author: &str) -> Result<Quote, StorageError> {
        let row: QuoteRow = sqlx::query_as(
            "INSERT INTO quotes (text, author) VALUES ($1, $2) RETURNING quote_id, text, author",
        )
        .bind(text)
        .bind(author)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list(&self) -> Result<Vec<Quote>, StorageError> {
        let rows: Vec<QuoteRow> =
            sqlx::query_as("SELECT quote_id, text, author FROM quotes ORDER BY quote_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Quote::from).collect())
    }
}
