//! Ошибки пути приёма и рассылки.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use quote_common::{ErrorBody, ValidationError};
use thiserror::Error;
use tracing::error;

/// Сбой слоя хранения.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Один подписчик пропустил сообщение. За пределы рассылки не выходит.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Причина отказа в записи.
///
/// Варианты взаимоисключающие: невалидный запрос до хранилища не доходит.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Текст ответа клиенту при сбое хранилища; подробности остаются в логах.
const STORAGE_FAILURE_MESSAGE: &str = "the quote store is unavailable";

impl IngestError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            Self::Validation(e) => e.to_string(),
            Self::Storage(e) => {
                error!(%e, "storage request failed");
                STORAGE_FAILURE_MESSAGE.to_string()
            }
        };
        let body = ErrorBody { code: code.to_string(), message };
        (status, Json(body)).into_response()
    }
}
