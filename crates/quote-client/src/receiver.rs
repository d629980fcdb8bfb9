//! Приёмник ленты: декодирует кадры с котировками и логирует их.

use std::future::Future;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use quote_common::{Quote, decode_quote};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

/// Ждёт следующую котировку из ленты.
///
/// Управляющие кадры пропускаются. Возвращает `Ok(None)`, когда сервер
/// закрывает соединение.
pub async fn next_quote<S>(stream: &mut S) -> Result<Option<Quote>>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame.context("read feed frame")? {
            Message::Text(text) => return Ok(Some(decode_quote(text.as_str())?)),
            Message::Binary(bytes) => {
                let text = std::str::from_utf8(&bytes).context("binary frame is not UTF-8")?;
                return Ok(Some(decode_quote(text)?));
            }
            Message::Close(frame) => {
                debug!(?frame, "server closed the feed");
                return Ok(None);
            }
            other => debug!(?other, "skipping control frame"),
        }
    }
    Ok(None)
}

/// Логирует каждую полученную котировку, пока не завершится `shutdown` или
/// сервер не закроет ленту. Возвращает число полученных котировок.
pub async fn run_receive_loop<S>(
    mut stream: S,
    shutdown: impl Future<Output = ()>,
) -> Result<usize>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    tokio::pin!(shutdown);
    let mut received = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("receive loop interrupted");
                break;
            }
            next = next_quote(&mut stream) => match next? {
                Some(quote) => {
                    received += 1;
                    info!(
                        id = quote.id,
                        author = %quote.author,
                        text = %quote.text,
                        "quote received"
                    );
                }
                None => break,
            },
        }
    }

    debug!(received, "receive loop exiting");
    Ok(received)
}
