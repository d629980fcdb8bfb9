//! Конфигурация сервера: флаги командной строки, каждый из которых можно
//! задать через окружение (и через `.env`, который загружает бинарник).

use std::{net::SocketAddr, num::NonZeroUsize, time::Duration};

use clap::Parser;
use quote_common::DEFAULT_HTTP_ADDR;

const DEFAULT_DB_POOL_SIZE: u32 = 5;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;
const DEFAULT_SUBSCRIBER_QUEUE: NonZeroUsize = NonZeroUsize::new(64).unwrap();

/// Сервер котировок реального времени.
///
/// Принимает котировки по HTTP, сохраняет их и отправляет каждую новую
/// WebSocket-подписчикам, подключённым к `/realtime`.
#[derive(Parser, Debug, Clone)]
#[command(name = "quote-server")]
#[command(version, about)]
pub struct ServerConfig {
    /// Адрес HTTP/WebSocket-слушателя.
    #[arg(long, env = "QUOTE_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    pub http_addr: SocketAddr,

    /// URL PostgreSQL. Без него котировки хранятся в памяти.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Максимум соединений в пуле БД.
    #[arg(long, env = "QUOTE_DB_POOL_SIZE", default_value_t = DEFAULT_DB_POOL_SIZE)]
    pub db_pool_size: u32,

    /// Сколько подписчик может принимать котировку, прежде чем его вытеснят.
    #[arg(long, env = "QUOTE_WRITE_TIMEOUT_MS", default_value_t = DEFAULT_WRITE_TIMEOUT_MS)]
    pub write_timeout_ms: u64,

    /// Сколько котировок копится на подписчика, пока его сокет занят.
    #[arg(long, env = "QUOTE_SUBSCRIBER_QUEUE", default_value_t = DEFAULT_SUBSCRIBER_QUEUE)]
    pub subscriber_queue: NonZeroUsize,
}

impl ServerConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Те же значения, что и у флагов по умолчанию, но без чтения окружения.
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_url: None,
            db_pool_size: DEFAULT_DB_POOL_SIZE,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
        }
    }
}
