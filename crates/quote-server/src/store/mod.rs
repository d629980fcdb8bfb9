//! Хранение котировок.
//!
//! Пути приёма нужны только «вставить и вернуть сохранённую запись» и
//! «перечислить всё»; оба бэкенда реализуют [`QuoteStore`].

mod memory;
mod postgres;

use async_trait::async_trait;
pub use memory::InMemoryQuoteStore;
pub use postgres::PgQuoteStore;
use quote_common::Quote;

use crate::error::StorageError;

/// Хранилище котировок, только на добавление.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Надёжно вставляет котировку и возвращает её с присвоенным id.
    ///
    /// Id уникальны и строго возрастают в порядке вставки.
    async fn insert(&self, text: &str, author: &str) -> Result<Quote, StorageError>;

    /// Все сохранённые котировки по возрастанию id.
    async fn list(&self) -> Result<Vec<Quote>, StorageError>;
}
