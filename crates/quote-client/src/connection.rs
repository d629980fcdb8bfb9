//! Подключение к WebSocket-ленте котировок.

use std::time::Duration;

use anyhow::{Context, Result};
use quote_common::REALTIME_PATH;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::info;

/// Сокет, по которому идёт лента.
pub type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Строит URL ленты по адресу сервера вида `127.0.0.1:8080`.
///
/// # Примеры
///
///
/// ```
/// use quote_client::connection::realtime_url;
///
/// assert_eq!(realtime_url("127.0.0.1:8080"), "ws://127.0.0.1:8080/realtime");
/// assert_eq!(realtime_url("ws://quotes.local"), "ws://quotes.local/realtime");
/// ```
pub fn realtime_url(server_addr: &str) -> String {
    let base = server_addr.trim_end_matches('/');
    if base.starts_with("ws://") || base.starts_with("wss://") {
        format!("{base}{REALTIME_PATH}")
    } else {
        format!("ws://{base}{REALTIME_PATH}")
    }
}

/// Подключается к ленте сервера. Котировки, сохранённые после возврата,
/// приходят в поток; более старые не повторяются.
pub async fn connect_feed(server_addr: &str) -> Result<FeedStream> {
    let url = realtime_url(server_addr);
    let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
        .await
        .with_context(|| format!("connect to {url} ({CONNECT_TIMEOUT:?} timeout)"))?
        .with_context(|| format!("connect to {url}"))?;
    info!(%url, status = %response.status(), "feed connected");
    Ok(stream)
}
