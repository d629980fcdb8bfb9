//! Путь записи: проверка, сохранение, затем рассылка.

use std::sync::Arc;

use quote_common::{DEFAULT_AUTHOR, NewQuote, Quote, ValidationError};
use tracing::{error, info};

use crate::{broadcast::Broadcaster, error::IngestError, store::QuoteStore};

/// Единственное место, где сохранение и рассылка упорядочены друг за другом.
///
/// Котировка публикуется строго после подтверждения хранилищем, один раз на
/// запрос, поэтому два последовательных запроса доходят до каждого
/// подписчика в том же порядке.
pub struct IngestionCoordinator {
    store: Arc<dyn QuoteStore>,
    broadcaster: Broadcaster,
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn QuoteStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// Сохраняет `candidate` и отправляет сохранённую котировку живым подписчикам.
    ///
    /// # Ошибки
    ///
    /// [`IngestError::Validation`], если `text` отсутствует или пуст (хранилище
    /// не трогается), [`IngestError::Storage`], если вставка не удалась
    /// (ничего не рассылается). Ошибки доставки никогда не возвращаются.
    pub async fn submit(&self, candidate: NewQuote) -> Result<Quote, IngestError> {
        let text = required_text(candidate.text)?;
        let author = author_or_default(candidate.author);

        let quote = self.store.insert(&text, &author).await.map_err(|e| {
            error!(%e, "failed to store quote");
            e
        })?;

        let report = self.broadcaster.publish(&quote).await;
        info!(
            id = quote.id,
            author = %quote.author,
            delivered = report.delivered,
            evicted = report.evicted,
            "quote stored"
        );
        Ok(quote)
    }

    /// Все сохранённые котировки по возрастанию id.
    pub async fn list(&self) -> Result<Vec<Quote>, IngestError> {
        Ok(self.store.list().await?)
    }
}

fn required_text(text: Option<String>) -> Result<String, ValidationError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ValidationError::MissingText),
    }
}

fn author_or_default(author: Option<String>) -> String {
    author.filter(|a| !a.trim().is_empty()).unwrap_or_else(|| DEFAULT_AUTHOR.to_string())
}
