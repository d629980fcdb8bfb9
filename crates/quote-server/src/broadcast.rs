//! Рассылка только что сохранённых котировок всем зарегистрированным подписчикам.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use quote_common::Quote;
use tracing::{debug, error, warn};

use crate::{
    error::DeliveryError,
    registry::{Payload, SubscriberRegistry},
};

/// Итог одного вызова рассылки, используется для логов.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Подписчики из снимка, снятого в начале вызова.
    pub attempted: usize,
    pub delivered: usize,
    /// Подписчики, удалённые из реестра из-за неудачной записи.
    pub evicted: usize,
}

/// Доставляет котировки текущему снимку реестра.
///
/// Записи идут параллельно и обрываются через `write_timeout`; подписчик,
/// чья запись упала или не уложилась во время, снимается с регистрации и
/// просто пропускает сообщение.
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    write_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, write_timeout: Duration) -> Self {
        Self { registry, write_timeout }
    }

    /// Отправляет `quote` каждому подписчику, зарегистрированному на момент вызова.
    ///
    /// Возвращается, когда каждый из них либо принял сообщение, либо был
    /// вытеснен. Ошибки доставки вызывающему не сообщаются.
    pub async fn publish(&self, quote: &Quote) -> PublishReport {
        let payload = match serde_json::to_string(quote) {
            Ok(json) => Payload::from(json),
            Err(e) => {
                error!(id = quote.id, %e, "failed to serialize quote");
                return PublishReport::default();
            }
        };

        let snapshot = self.registry.enumerate();
        let mut report = PublishReport { attempted: snapshot.len(), ..PublishReport::default() };
        if snapshot.is_empty() {
            debug!(id = quote.id, "no subscribers");
            return report;
        }

        let limit = self.write_timeout;
        let attempts = snapshot.into_iter().map(|(id, sink)| {
            let payload = payload.clone();
            async move {
                let outcome = match tokio::time::timeout(limit, sink.send(payload)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(DeliveryError::Timeout(limit)),
                };
                (id, outcome)
            }
        });

        for (id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber = %id, quote = quote.id, %e, "delivery failed, evicting");
                    // Подписчик мог уйти сам, пока запись была в полёте.
                    if self.registry.deregister(id) {
                        report.evicted += 1;
                    }
                }
            }
        }

        debug!(
            id = quote.id,
            attempted = report.attempted,
            delivered = report.delivered,
            evicted = report.evicted,
            "quote published"
        );
        report
    }
}
