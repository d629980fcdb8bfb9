//! HTTP-интерфейс.
//!
//! ```text
//! GET  /quotes    список сохранённых котировок
//! POST /quotes    новая котировка (201 + сохранённая запись)
//! GET  /realtime  WebSocket-лента новых котировок
//! GET  /health    проверка живости + число подписчиков
//! ```

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use quote_common::{ErrorBody, HEALTH_PATH, Health, NewQuote, QUOTES_PATH, Quote, REALTIME_PATH};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::{
    broadcast::Broadcaster, config::ServerConfig, error::IngestError, gateway,
    ingest::IngestionCoordinator, registry::SubscriberRegistry, store::QuoteStore,
};

/// Общее состояние всех обработчиков.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<IngestionCoordinator>,
    pub registry: Arc<SubscriberRegistry>,
    pub subscriber_queue: NonZeroUsize,
    /// Время на запись одного кадра в сокет подписчика.
    pub write_timeout: Duration,
}

impl AppState {
    /// Собирает новый реестр, рассылку и координатор вокруг `store`.
    pub fn new(store: Arc<dyn QuoteStore>, config: &ServerConfig) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), config.write_timeout());
        Self {
            coordinator: Arc::new(IngestionCoordinator::new(store, broadcaster)),
            registry,
            subscriber_queue: config.subscriber_queue,
            write_timeout: config.write_timeout(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(QUOTES_PATH, get(list_quotes).post(create_quote))
        .route(REALTIME_PATH, get(gateway::realtime))
        .route(HEALTH_PATH, get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_quotes(State(state): State<AppState>) -> Result<Json<Vec<Quote>>, IngestError> {
    Ok(Json(state.coordinator.list().await?))
}

async fn create_quote(
    State(state): State<AppState>,
    body: Result<Json<NewQuote>, JsonRejection>,
) -> Result<(StatusCode, Json<Quote>), Response> {
    let Json(candidate) = body.map_err(|rejection| {
        debug!(%rejection, "unreadable quote body");
        let body = ErrorBody { code: "INVALID_BODY".into(), message: rejection.body_text() };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    })?;

    let quote = state.coordinator.submit(candidate).await.map_err(IntoResponse::into_response)?;
    Ok((StatusCode::CREATED, Json(quote)))
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health { status: "ok".into(), subscribers: state.registry.len() })
}
