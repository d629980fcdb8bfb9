//! Реестр живых realtime-подписчиков.
//!
//! Изменения состава берут блокировку только на время работы с картой;
//! [`enumerate()`](SubscriberRegistry::enumerate) отдаёт копию, поэтому
//! рассылка никогда не держит блокировку во время записи в соединение.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use axum::extract::ws::Utf8Bytes;
use tracing::debug;

use crate::error::DeliveryError;

/// Сериализованная котировка. Клоны делят один буфер, так что все
/// подписчики получают одну и ту же копию.
pub type Payload = Utf8Bytes;

/// Уникальный в пределах процесса идентификатор подписчика. Не переиспользуется.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Точка записи одного подписчика.
///
/// `send` обязан вернуть [`DeliveryError::Closed`] для закрытого соединения,
/// а не зависнуть; ограничивать медленную запись должен вызывающий.
#[async_trait]
pub trait SubscriberSink: Send + Sync {
    async fn send(&self, payload: Payload) -> Result<(), DeliveryError>;

    /// Вызывается ровно один раз, когда подписчик покидает реестр.
    fn close(&self) {}
}

type Sinks = HashMap<SubscriberId, Arc<dyn SubscriberSink>>;

/// Потокобезопасное множество активных подписчиков.
///
/// # Примеры
///
/// ```
/// use std::sync::Arc;
///
/// use async_trait::async_trait;
/// use quote_server::{
///     error::DeliveryError,
///     registry::{Payload, SubscriberRegistry, SubscriberSink},
/// };
///
/// struct Discard;
///
/// #[async_trait]
/// impl SubscriberSink for Discard {
///     async fn send(&self, _payload: Payload) -> Result<(), DeliveryError> {
///         Ok(())
///     }
/// }
///
/// let registry = SubscriberRegistry::new();
/// let id = registry.register(Arc::new(Discard));
/// assert_eq!(registry.len(), 1);
/// assert!(registry.deregister(id));
/// assert!(!registry.deregister(id));
/// assert!(registry.is_empty());
/// ```
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    sinks: Mutex<Sinks>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет соединение и возвращает его новый идентификатор.
    pub fn register(&self, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().insert(id, sink);
        debug!(subscriber = %id, "registered");
        id
    }

    /// Удаляет соединение и сообщает ему об этом через
    /// [`SubscriberSink::close`]. Возвращает `false`, если его уже не было.
    pub fn deregister(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(sink) => {
                sink.close();
                debug!(subscriber = %id, "deregistered");
                true
            }
            None => false,
        }
    }

    /// Снимок активных соединений на момент вызова.
    pub fn enumerate(&self) -> Vec<(SubscriberId, Arc<dyn SubscriberSink>)> {
        self.lock().iter().map(|(id, sink)| (*id, Arc::clone(sink))).collect()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Владельцы блокировки не паникуют посреди изменения, карта остаётся целой.
    fn lock(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::atomic::AtomicUsize};

    use super::*;

    #[derive(Default)]
    struct NullSink {
        closed: AtomicUsize,
    }

    #[async_trait]
    impl SubscriberSink for NullSink {
        async fn send(&self, _payload: Payload) -> Result<(), DeliveryError> {
            Ok(())
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sink() -> Arc<dyn SubscriberSink> {
        Arc::new(NullSink::default())
    }

    #[test]
    fn every_register_yields_a_new_id() {
        let registry = SubscriberRegistry::new();
        let shared = sink();
        let a = registry.register(Arc::clone(&shared));
        let b = registry.register(shared);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_deregister() {
        let registry = SubscriberRegistry::new();
        let first = registry.register(sink());
        registry.deregister(first);
        let second = registry.register(sink());
        assert!(second > first);
    }

    #[test]
    fn deregister_twice_is_silent() {
        let registry = SubscriberRegistry::new();
        let id = registry.register(sink());
        assert!(registry.deregister(id));
        assert!(!registry.deregister(id));
        assert!(!registry.contains(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn deregister_closes_the_sink_once() {
        let registry = SubscriberRegistry::new();
        let sink = Arc::new(NullSink::default());
        let id = registry.register(sink.clone());

        registry.deregister(id);
        registry.deregister(id);

        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enumerate_is_a_snapshot() {
        let registry = SubscriberRegistry::new();
        let a = registry.register(sink());
        let snapshot = registry.enumerate();

        registry.deregister(a);
        let b = registry.register(sink());

        let ids: Vec<_> = snapshot.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a]);
        let now: Vec<_> = registry.enumerate().into_iter().map(|(id, _)| id).collect();
        assert_eq!(now, vec![b]);
    }

    #[test]
    fn concurrent_membership_changes_stay_consistent() {
        let registry = Arc::new(SubscriberRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let ids: Vec<_> = (0..100).map(|_| registry.register(sink())).collect();
                    for id in ids.iter().step_by(2) {
                        assert!(registry.deregister(*id));
                    }
                    ids
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        assert_eq!(all.len(), 800, "ids must be unique across threads");
        assert_eq!(registry.len(), 400);
    }

    #[test]
    fn display_is_prefixed() {
        let registry = SubscriberRegistry::new();
        let id = registry.register(sink());
        assert_eq!(id.to_string(), format!("sub-{}", id.0));
    }
}
