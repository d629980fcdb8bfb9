//! Realtime-шлюз на WebSocket.
//!
//! У каждого принятого соединения своя ограниченная исходящая очередь. Её
//! отправляющая сторона лежит в реестре ([`ChannelSink`]); отдельная задача
//! переносит очередь в сокет, так что медленный клиент блокирует только
//! собственную очередь.
//!
//! Снятие с регистрации отменяет токен соединения: задача бросает недописанный
//! кадр и остаток очереди, отправляет Close и отпускает сокет.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    api::AppState,
    error::DeliveryError,
    registry::{Payload, SubscriberRegistry, SubscriberSink},
};

/// Верхняя граница ожидания при отправке Close вытесненному клиенту.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// [`SubscriberSink`], который кладёт сообщения в очередь задачи соединения.
pub struct ChannelSink {
    tx: mpsc::Sender<Payload>,
    evicted: CancellationToken,
}

impl ChannelSink {
    /// `evicted` отменяется, когда подписчика снимают с регистрации.
    pub fn new(tx: mpsc::Sender<Payload>, evicted: CancellationToken) -> Self {
        Self { tx, evicted }
    }
}

#[async_trait]
impl SubscriberSink for ChannelSink {
    async fn send(&self, payload: Payload) -> Result<(), DeliveryError> {
        // Ждёт места в очереди; время ожидания ограничивает рассылка.
        self.tx.send(payload).await.map_err(|_| DeliveryError::Closed)
    }

    fn close(&self) {
        self.evicted.cancel();
    }
}

/// Ограничения одного соединения.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Ёмкость исходящей очереди.
    pub queue: usize,
    /// Время на запись одного кадра в сокет.
    pub write_timeout: Duration,
}

/// `GET /realtime`: переключает соединение на WebSocket и шлёт новые котировки.
pub async fn realtime(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let registry = Arc::clone(&state.registry);
    let limits = ConnectionLimits {
        queue: state.subscriber_queue.get(),
        write_timeout: state.write_timeout,
    };
    ws.on_upgrade(move |socket| serve_subscriber(socket, registry, limits))
}

/// Почему соединение завершилось.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    ClientClosed,
    Evicted,
    Stalled,
    TransportError,
}

/// Регистрирует соединение, пишет в него котировки из очереди, пока оно живо,
/// затем снимает с регистрации.
///
/// `socket` это [`axum::extract::ws::WebSocket`] или любой другой поток кадров
/// с тем же интерфейсом.
pub async fn serve_subscriber<S, E>(
    mut socket: S,
    registry: Arc<SubscriberRegistry>,
    limits: ConnectionLimits,
) where
    S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Unpin,
    E: fmt::Display,
{
    let (tx, mut rx) = mpsc::channel::<Payload>(limits.queue);
    let evicted = CancellationToken::new();
    let id = registry.register(Arc::new(ChannelSink::new(tx, evicted.clone())));
    info!(subscriber = %id, subscribers = registry.len(), "subscriber connected");

    let reason = loop {
        tokio::select! {
            biased;
            () = evicted.cancelled() => break Disconnect::Evicted,
            outbound = rx.recv() => {
                // Отправитель живёт только в реестре.
                let Some(payload) = outbound else { break Disconnect::Evicted };
                let write = tokio::time::timeout(
                    limits.write_timeout,
                    socket.send(Message::Text(payload)),
                );
                let written = tokio::select! {
                    biased;
                    () = evicted.cancelled() => break Disconnect::Evicted,
                    written = write => written,
                };
                match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(subscriber = %id, %e, "failed to write quote");
                        break Disconnect::TransportError;
                    }
                    Err(_) => {
                        let timeout = limits.write_timeout;
                        warn!(subscriber = %id, ?timeout, "socket write stalled");
                        break Disconnect::Stalled;
                    }
                }
            }
            inbound = socket.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break Disconnect::ClientClosed,
                Some(Ok(_)) => debug!(subscriber = %id, "ignoring inbound frame"),
                Some(Err(e)) => {
                    warn!(subscriber = %id, %e, "websocket error");
                    break Disconnect::TransportError;
                }
            },
        }
    };

    // Очередь закрывается до снятия с регистрации и не дописывается.
    rx.close();
    registry.deregister(id);
    drop(rx);

    if matches!(reason, Disconnect::Evicted | Disconnect::Stalled) {
        let frame = CloseFrame {
            code: close_code::AGAIN,
            reason: Utf8Bytes::from_static("subscriber too slow"),
        };
        let close = socket.send(Message::Close(Some(frame)));
        match tokio::time::timeout(limits.write_timeout.min(CLOSE_TIMEOUT), close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(subscriber = %id, %e, "close frame not written"),
            Err(_) => debug!(subscriber = %id, "close frame timed out"),
        }
    }
    info!(subscriber = %id, ?reason, subscribers = registry.len(), "subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use std::{
        pin::Pin,
        sync::Mutex,
        task::{Context, Poll},
    };

    use quote_common::Quote;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::broadcast::Broadcaster;

    type Written = Arc<Mutex<Vec<Message>>>;

    /// Сокет в памяти. В режиме `stalled` ни один кадр не уходит: клиент не читает.
    struct FakeSocket {
        inbound: mpsc::UnboundedReceiver<Message>,
        written: Written,
        stalled: bool,
    }

    impl FakeSocket {
        fn new(stalled: bool) -> (Self, mpsc::UnboundedSender<Message>, Written) {
            let (tx, inbound) = mpsc::unbounded_channel();
            let written = Written::default();
            (Self { inbound, written: Arc::clone(&written), stalled }, tx, written)
        }
    }

    impl Stream for FakeSocket {
        type Item = Result<Message, String>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inbound.poll_recv(cx).map(|frame| frame.map(Ok))
        }
    }

    impl Sink<Message> for FakeSocket {
        type Error = String;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            if self.stalled { Poll::Pending } else { Poll::Ready(Ok(())) }
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), String> {
            self.written.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Ready(Ok(()))
        }
    }

    fn quote(id: i64) -> Quote {
        Quote { id, text: format!("quote {id}"), author: "Unknown".into() }
    }

    fn spawn_connection(
        socket: FakeSocket,
        registry: &Arc<SubscriberRegistry>,
        limits: ConnectionLimits,
    ) -> JoinHandle<()> {
        tokio::spawn(serve_subscriber(socket, Arc::clone(registry), limits))
    }

    async fn wait_for_len(registry: &SubscriberRegistry, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.len() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry size never settled");
    }

    async fn finishes_within(task: JoinHandle<()>, limit: Duration) {
        tokio::time::timeout(limit, task)
            .await
            .expect("connection task kept running")
            .unwrap();
    }

    #[tokio::test]
    async fn channel_sink_enqueues_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = ChannelSink::new(tx, CancellationToken::new());

        sink.send(Payload::from_static("one")).await.unwrap();
        sink.send(Payload::from_static("two")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().as_str(), "one");
        assert_eq!(rx.recv().await.unwrap().as_str(), "two");
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_connection() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = ChannelSink::new(tx, CancellationToken::new());
        rx.close();

        assert_eq!(sink.send(Payload::from_static("late")).await, Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn full_queue_blocks_until_broadcaster_times_out() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (tx, _rx) = mpsc::channel(1);
        let evicted = CancellationToken::new();
        let id = registry.register(Arc::new(ChannelSink::new(tx, evicted.clone())));
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Duration::from_millis(50));

        assert_eq!(broadcaster.publish(&quote(1)).await.delivered, 1);

        let report = broadcaster.publish(&quote(2)).await;
        assert_eq!(report.evicted, 1);
        assert!(!registry.contains(id));
        assert!(evicted.is_cancelled());
    }

    #[tokio::test]
    async fn evicted_subscriber_stops_without_draining_its_queue() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (socket, _inbound, written) = FakeSocket::new(true);
        let limits = ConnectionLimits { queue: 1, write_timeout: Duration::from_secs(30) };
        let task = spawn_connection(socket, &registry, limits);
        wait_for_len(&registry, 1).await;

        // Задача забирает одну котировку и виснет на записи, следующая
        // заполняет очередь, третья упирается в таймаут.
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Duration::from_millis(50));
        let mut id = 0;
        loop {
            id += 1;
            assert!(id <= 10, "subscriber was never evicted");
            if broadcaster.publish(&quote(id)).await.evicted == 1 {
                break;
            }
        }

        finishes_within(task, Duration::from_secs(3)).await;
        assert!(registry.is_empty());
        assert!(written.lock().unwrap().is_empty(), "nothing may be written after eviction");
    }

    #[tokio::test]
    async fn evicted_subscriber_receives_close_frame() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (socket, _inbound, written) = FakeSocket::new(false);
        let limits = ConnectionLimits { queue: 4, write_timeout: Duration::from_secs(1) };
        let task = spawn_connection(socket, &registry, limits);
        wait_for_len(&registry, 1).await;

        let id = registry.enumerate()[0].0;
        assert!(registry.deregister(id));

        finishes_within(task, Duration::from_secs(2)).await;
        let written = written.lock().unwrap();
        let closed_for_retry =
            matches!(&written[..], [Message::Close(Some(frame))] if frame.code == close_code::AGAIN);
        assert!(closed_for_retry, "unexpected frames: {written:?}");
    }

    #[tokio::test]
    async fn stalled_socket_write_ends_the_connection() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (socket, _inbound, _written) = FakeSocket::new(true);
        let limits = ConnectionLimits { queue: 4, write_timeout: Duration::from_millis(50) };
        let task = spawn_connection(socket, &registry, limits);
        wait_for_len(&registry, 1).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry), Duration::from_millis(500));
        assert_eq!(broadcaster.publish(&quote(1)).await.delivered, 1);

        finishes_within(task, Duration::from_secs(2)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn delivered_quotes_are_written_as_text_frames() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (socket, inbound, written) = FakeSocket::new(false);
        let limits = ConnectionLimits { queue: 4, write_timeout: Duration::from_secs(1) };
        let task = spawn_connection(socket, &registry, limits);
        wait_for_len(&registry, 1).await;

        let broadcaster = Broadcaster::new(Arc::clone(&registry), Duration::from_millis(500));
        broadcaster.publish(&quote(1)).await;
        broadcaster.publish(&quote(2)).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while written.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        inbound.send(Message::Close(None)).unwrap();
        finishes_within(task, Duration::from_secs(2)).await;
        assert!(registry.is_empty());

        let ids: Vec<i64> = written
            .lock()
            .unwrap()
            .iter()
            .map(|frame| match frame {
                Message::Text(text) => serde_json::from_str::<Quote>(text.as_str()).unwrap().id,
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![1, 2], "client close must not trigger a close frame");
    }
}
