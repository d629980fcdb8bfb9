//! Библиотека quote-server: сохраняет присланные котировки и рассылает каждую
//! новую живым WebSocket-подписчикам.
//!
//! ```text
//! POST /quotes ─► IngestionCoordinator ─► QuoteStore::insert
//!                          │
//!                          └─► Broadcaster::publish ─► SubscriberRegistry::enumerate
//!                                        │
//!                                        ├─► ChannelSink ─► задача соединения ─► WebSocket
//!                                        └─► ChannelSink ─► задача соединения ─► WebSocket
//! ```

use std::{future::Future, sync::Arc};

use tokio::net::TcpListener;
use tracing::info;

pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod registry;
pub mod store;

use crate::{
    api::AppState,
    config::ServerConfig,
    error::StorageError,
    store::{InMemoryQuoteStore, PgQuoteStore, QuoteStore},
};

/// Открывает хранилище по `config`: PostgreSQL (с применёнными миграциями),
/// если задан URL базы, иначе хранилище в памяти.
pub async fn open_store(config: &ServerConfig) -> Result<Arc<dyn QuoteStore>, StorageError> {
    match &config.database_url {
        Some(url) => {
            let store = PgQuoteStore::connect(url, config.db_pool_size).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            info!("no database configured, keeping quotes in memory");
            Ok(Arc::new(InMemoryQuoteStore::new()))
        }
    }
}

/// Обслуживает API на `listener`, пока не завершится `shutdown`.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "HTTP listener started");
    axum::serve(listener, api::router(state)).with_graceful_shutdown(shutdown).await
}
