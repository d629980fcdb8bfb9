//! [`QuoteStore`] в памяти процесса: для тестов и для запуска без базы.

use async_trait::async_trait;
use quote_common::Quote;
use tokio::sync::RwLock;

use super::QuoteStore;
use crate::error::StorageError;

/// Котировки в `Vec`; id выдаются под блокировкой записи, начиная с 1.
#[derive(Debug, Default)]
pub struct InMemoryQuoteStore {
    quotes: RwLock<Vec<Quote>>,
}

impl InMemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn insert(&self, text: &str, author: &str) -> Result<Quote, StorageError> {
        let mut quotes = self.quotes.write().await;
        let id = quotes.last().map_or(1, |q| q.id + 1);
        let quote = Quote { id, text: text.to_string(), author: author.to_string() };
        quotes.push(quote.clone());
        Ok(quote)
    }

    async fn list(&self) -> Result<Vec<Quote>, StorageError> {
        Ok(self.quotes.read().await.clone())
    }
}
