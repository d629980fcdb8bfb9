//! HTTP-запросы к путям записи и чтения.

use anyhow::{Context, Result};
use quote_common::{ErrorBody, NewQuote, ProtocolError, QUOTES_PATH, Quote};
use reqwest::{Client, Response};
use tracing::debug;

/// Тонкий клиент для `/quotes`.
#[derive(Debug, Clone)]
pub struct QuoteApi {
    http: Client,
    quotes_url: String,
}

impl QuoteApi {
    /// `server_addr` это `host:port`, по желанию со схемой `http(s)://`.
    pub fn new(server_addr: &str) -> Self {
        let base = server_addr.trim_end_matches('/');
        let base = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("http://{base}")
        };
        Self { http: Client::new(), quotes_url: format!("{base}{QUOTES_PATH}") }
    }

    /// Отправляет котировку и возвращает сохранённую запись.
    ///
    /// Отказ сервера приходит как [`ProtocolError::Rejected`].
    pub async fn post(&self, candidate: &NewQuote) -> Result<Quote> {
        let response = self
            .http
            .post(&self.quotes_url)
            .json(candidate)
            .send()
            .await
            .with_context(|| format!("POST {}", self.quotes_url))?;
        let quote: Quote = decode(response).await?;
        debug!(id = quote.id, "quote stored");
        Ok(quote)
    }

    /// Все сохранённые котировки в порядке id.
    pub async fn list(&self) -> Result<Vec<Quote>> {
        let response = self
            .http
            .get(&self.quotes_url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.quotes_url))?;
        decode(response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.with_context(|| format!("decode response ({status})"));
    }
    let body: ErrorBody =
        response.json().await.with_context(|| format!("decode error body ({status})"))?;
    Err(ProtocolError::Rejected { code: body.code, message: body.message }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_gets_scheme_and_path() {
        assert_eq!(QuoteApi::new("127.0.0.1:8080").quotes_url, "http://127.0.0.1:8080/quotes");
        let api = QuoteApi::new("https://quotes.local/");
        assert_eq!(api.quotes_url, "https://quotes.local/quotes");
    }
}
