//! Client for the real-time channel.

use futures::stream::{SplitSink, SplitStream, StreamExt};
use futures::SinkExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::task;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tracing::{debug, warn};

use crate::protocol::{ClientMessage, ServerMessage};

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed before a {0:?} message arrived")]
    Closed(MessageKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Map,
    Orders,
    Pong,
    Error,
}

impl MessageKind {
    fn of(message: &ServerMessage) -> Self {
        match message {
            ServerMessage::Map { .. } => MessageKind::Map,
            ServerMessage::Orders { .. } => MessageKind::Orders,
            ServerMessage::Pong => MessageKind::Pong,
            ServerMessage::Error { .. } => MessageKind::Error,
        }
    }
}

#[derive(Default)]
struct WaitQueue {
    closed: bool,
    pending: VecDeque<(MessageKind, triggered::Trigger)>,
}

type Waiters = Arc<RwLock<WaitQueue>>;

pub struct RemoteCanvas {
    inbox: Arc<RwLock<Vec<ServerMessage>>>,
    _socket_read: Arc<RwLock<SplitStream<WebSocketStream>>>,
    socket_write: Arc<RwLock<SplitSink<WebSocketStream, Message>>>,
    updater_task: task::JoinHandle<()>,
    waiters: Waiters,
}

impl RemoteCanvas {
    pub async fn new(server_url: url::Url) -> Result<Self, ClientError> {
        let (socket, _) = connect_async(server_url.as_str()).await?;
        let (socket_write, socket_read) = {
            let (write, read) = socket.split();
            (Arc::new(RwLock::new(write)), Arc::new(RwLock::new(read)))
        };
        let inbox = Arc::new(RwLock::new(Vec::new()));
        let waiters: Waiters = Arc::new(RwLock::new(WaitQueue::default()));
        let updater_task = {
            let inbox = inbox.clone();
            let socket_read = socket_read.clone();
            let waiters = waiters.clone();
            task::spawn(async move {
                loop {
                    let frame = socket_read.write().await.next().await;
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => {
                            warn!("client read failed: {err}");
                            break;
                        }
                    };
                    let message: ServerMessage = match serde_json::from_str(&text) {
                        Ok(message) => message,
                        Err(err) => {
                            warn!("unexpected message {text}: {err}");
                            continue;
                        }
                    };
                    debug!(?message, "received message");
                    let kind = MessageKind::of(&message);
                    inbox.write().await.push(message);
                    let mut waiters = waiters.write().await;
                    let (ready, pending): (VecDeque<_>, VecDeque<_>) =
                        waiters.pending.drain(..).partition(|(k, _)| *k == kind);
                    waiters.pending = pending;
                    for (_, trigger) in ready {
                        trigger.trigger();
                    }
                }
                // Wake everyone still waiting; they will find nothing new.
                let mut waiters = waiters.write().await;
                waiters.closed = true;
                for (_, trigger) in waiters.pending.drain(..) {
                    trigger.trigger();
                }
            })
        };
        Ok(Self {
            inbox,
            _socket_read: socket_read,
            socket_write,
            updater_task,
            waiters,
        })
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let frame = Message::text(message.encode());
        self.socket_write.write().await.send(frame).await?;
        Ok(())
    }

    /// Sends `message`, then waits for the next server message of `kind`.
    async fn request(
        &self,
        message: &ClientMessage,
        kind: MessageKind,
    ) -> Result<ServerMessage, ClientError> {
        let seen = self.received().await;
        self.send(message).await?;
        self.wait_for(kind, seen).await
    }

    /// Waits for the first message of `kind` at or after inbox position
    /// `since`, which may already have arrived.
    pub async fn wait_for(
        &self,
        kind: MessageKind,
        since: usize,
    ) -> Result<ServerMessage, ClientError> {
        let find = |inbox: &[ServerMessage]| {
            inbox
                .iter()
                .skip(since)
                .find(|m| MessageKind::of(m) == kind)
                .cloned()
        };
        loop {
            let listener = {
                // Holding the queue while reading the inbox means a message
                // pushed after the read cannot miss our trigger.
                let mut waiters = self.waiters.write().await;
                if let Some(found) = find(self.inbox.read().await.as_slice()) {
                    return Ok(found);
                }
                if waiters.closed {
                    return Err(ClientError::Closed(kind));
                }
                let (trigger, listener) = triggered::trigger();
                waiters.pending.push_back((kind, trigger));
                listener
            };
            listener.await;
        }
    }

    /// Number of messages received so far.
    pub async fn received(&self) -> usize {
        self.inbox.read().await.len()
    }

    pub async fn brand(&self, label: &str) -> Result<(), ClientError> {
        self.send(&ClientMessage::Brand {
            brand: Some(label.to_string()),
        })
        .await
    }

    pub async fn place_pixel(&self, x: i64, y: i64, color: i64) -> Result<(), ClientError> {
        self.send(&ClientMessage::PlacePixel {
            x: Some(x),
            y: Some(y),
            color: Some(color),
        })
        .await
    }

    /// Sends a raw text frame, bypassing the message encoder.
    pub async fn send_raw(&self, text: &str) -> Result<(), ClientError> {
        self.socket_write
            .write()
            .await
            .send(Message::text(text))
            .await?;
        Ok(())
    }

    /// Round-trips a ping. Replies on one session are ordered, so once this
    /// returns every earlier reply is in [`RemoteCanvas::messages`].
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.request(&ClientMessage::Ping, MessageKind::Pong).await?;
        Ok(())
    }

    pub async fn fetch_map(&self) -> Result<String, ClientError> {
        match self.request(&ClientMessage::GetMap, MessageKind::Map).await? {
            ServerMessage::Map { data, .. } => Ok(data),
            _ => Err(ClientError::Closed(MessageKind::Map)),
        }
    }

    pub async fn fetch_orders(&self) -> Result<String, ClientError> {
        match self
            .request(&ClientMessage::GetOrders, MessageKind::Orders)
            .await?
        {
            ServerMessage::Orders { data, .. } => Ok(data),
            _ => Err(ClientError::Closed(MessageKind::Orders)),
        }
    }

    /// Everything received so far, oldest first.
    pub async fn messages(&self) -> Vec<ServerMessage> {
        self.inbox.read().await.clone()
    }

    pub async fn close(self) {
        let _ = self.socket_write.write().await.close().await;
        self.updater_task.abort();
    }
}
