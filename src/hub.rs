//! Live sessions, inbound message dispatch and canvas broadcasts.
//!
//! Canvas state and the session set share one `RwLock`, so every mutation of
//! either is ordered with respect to the others. Each session owns an outbound
//! bounded queue drained by its own writer task; sending never waits on a
//! socket, and a session that stops reading loses messages instead of
//! growing its queue.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::canvas::{CanvasState, CanvasVersion};
use crate::clock::Clock;
use crate::config::{CanvasGeometry, Config, LabelPolicy, DEFAULT_LABEL};
use crate::palette;
use crate::persist::{PersistError, PersistedState, Persistence};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::stats::{self, UsageSnapshot};

/// Messages buffered per session before new ones are dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The short form is what operators grep for in logs.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Where a connection came from, as far as the handshake tells us.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub peer: Option<SocketAddr>,
    pub forwarded_for: Option<String>,
    pub user_agent: Option<String>,
}

impl Origin {
    fn address(&self) -> String {
        match (&self.forwarded_for, self.peer) {
            (Some(forwarded), _) => forwarded.clone(),
            (None, Some(peer)) => peer.to_string(),
            (None, None) => "unknown".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ClientSession {
    pub id: SessionId,
    pub label: String,
    pub last_placed_at: i64,
    pub connected_at: i64,
    pub origin: Origin,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ClientSession {
    fn deliver(&self, message: ServerMessage) -> bool {
        enqueue(self.id, &self.outbound, message)
    }
}

fn enqueue(
    id: SessionId,
    outbound: &mpsc::Sender<ServerMessage>,
    message: ServerMessage,
) -> bool {
    match outbound.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(session = %id, "outbound queue full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            warn!(session = %id, "outbound queue closed, dropping message");
            false
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("session {0} is not registered")]
    UnknownSession(SessionId),
}

/// Current target plus the newest history entries, read under one lock.
#[derive(Debug, Clone)]
pub struct MapView {
    pub current: CanvasVersion,
    pub recent: Vec<CanvasVersion>,
}

struct Shared {
    canvas: CanvasState,
    sessions: HashMap<SessionId, ClientSession>,
}

struct HubInner {
    shared: RwLock<Shared>,
    stats: RwLock<UsageSnapshot>,
    clock: Arc<dyn Clock>,
    persistence: Persistence,
    geometry: CanvasGeometry,
    labels: LabelPolicy,
    cooldown_ms: i64,
    activity_window_ms: i64,
    recent_history: usize,
}

#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(
        config: &Config,
        canvas: CanvasState,
        persistence: Persistence,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = HubInner {
            shared: RwLock::new(Shared {
                canvas,
                sessions: HashMap::new(),
            }),
            stats: RwLock::new(UsageSnapshot::default()),
            clock,
            persistence,
            geometry: config.canvas,
            labels: config.labels.clone(),
            cooldown_ms: config.cooldown.as_millis() as i64,
            activity_window_ms: config.activity_window.as_millis() as i64,
            recent_history: config.recent_history,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    pub fn geometry(&self) -> CanvasGeometry {
        self.inner.geometry
    }

    pub async fn on_connect(
        &self,
        origin: Origin,
    ) -> (SessionId, mpsc::Receiver<ServerMessage>) {
        let (outbound, receiver) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let id = SessionId::new();
        info!(
            session = %id,
            address = %origin.address(),
            user_agent = origin.user_agent.as_deref().unwrap_or("missing user-agent"),
            "[+] client connected"
        );
        let session = ClientSession {
            id,
            label: DEFAULT_LABEL.to_string(),
            last_placed_at: 0,
            connected_at: self.now_ms(),
            origin,
            outbound,
        };
        self.inner.shared.write().await.sessions.insert(id, session);
        (id, receiver)
    }

    pub async fn on_disconnect(&self, id: SessionId) {
        if self.inner.shared.write().await.sessions.remove(&id).is_some() {
            info!(session = %id, "[-] client disconnected");
        }
    }

    /// Handles one raw frame. Bad input is answered on the session itself;
    /// only a missing session is an error.
    pub async fn on_message(&self, id: SessionId, raw: &[u8]) -> Result<(), HubError> {
        let message = ClientMessage::decode(raw);
        let mut guard = self.inner.shared.write().await;
        let shared = &mut *guard;
        let session = shared
            .sessions
            .get_mut(&id)
            .ok_or(HubError::UnknownSession(id))?;

        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(session = %id, "rejected frame: {err}");
                session.deliver(ServerMessage::error(err.to_string()));
                return Ok(());
            }
        };

        match message {
            ClientMessage::Brand { brand } => match brand {
                Some(label) if self.inner.labels.accepts(&label) => {
                    debug!(session = %id, label = %label, "client branded");
                    session.label = label;
                }
                _ => {}
            },
            ClientMessage::GetMap => {
                session.deliver(ServerMessage::Map {
                    data: shared.canvas.current().image.clone(),
                    reason: None,
                });
            }
            ClientMessage::GetOrders => {
                session.deliver(ServerMessage::Orders {
                    data: shared.canvas.current().orders.clone(),
                    reason: None,
                });
            }
            ClientMessage::PlacePixel { x, y, color } => {
                let now = self.now_ms();
                if now - session.last_placed_at < self.inner.cooldown_ms {
                    debug!(session = %id, "placement inside cooldown dropped");
                    return Ok(());
                }
                let (x, y, color) = match (x, y, color) {
                    (Some(x), Some(y), Some(color))
                        if self.inner.geometry.contains(x, y) && palette::contains(color) =>
                    {
                        (x, y, color)
                    }
                    _ => {
                        session.deliver(ServerMessage::error("Invalid placement!"));
                        return Ok(());
                    }
                };
                session.last_placed_at = now;
                let total = shared.canvas.record_placement();
                info!(session = %id, x, y, color, total, "pixel placed");
            }
            ClientMessage::Ping => {
                session.deliver(ServerMessage::Pong);
            }
            ClientMessage::Unrecognized(kind) => {
                debug!(session = %id, kind = %kind, "unknown command");
                session.deliver(ServerMessage::error("Unknown command!"));
            }
        }
        Ok(())
    }

    /// Sends `map` then `orders` for `version` to every open session.
    /// Returns how many sessions could not be reached.
    pub async fn broadcast_canvas_update(&self, version: &CanvasVersion) -> usize {
        let targets: Vec<(SessionId, mpsc::Sender<ServerMessage>)> = {
            let shared = self.inner.shared.read().await;
            shared
                .sessions
                .values()
                .map(|s| (s.id, s.outbound.clone()))
                .collect()
        };
        let reason = Some(version.reason.clone());
        let map = ServerMessage::Map {
            data: version.image.clone(),
            reason: reason.clone(),
        };
        let orders = ServerMessage::Orders {
            data: version.orders.clone(),
            reason,
        };

        let mut failed = 0;
        for (id, outbound) in &targets {
            if !enqueue(*id, outbound, map.clone()) || !enqueue(*id, outbound, orders.clone()) {
                warn!(session = %id, "broadcast could not reach session");
                failed += 1;
            }
        }
        info!(
            sessions = targets.len(),
            failed,
            map = %version.image,
            "broadcast canvas update"
        );
        failed
    }

    /// Installs `version` as current, broadcasts it and saves state. A failed
    /// save is logged; the in-memory state stays authoritative.
    pub async fn publish(&self, version: CanvasVersion) -> CanvasVersion {
        let current = {
            let mut shared = self.inner.shared.write().await;
            shared.canvas.apply(version);
            shared.canvas.current().clone()
        };
        self.broadcast_canvas_update(&current).await;
        if let Err(err) = self.persist().await {
            error!("saving state after update failed: {err}");
        }
        current
    }

    pub async fn persist(&self) -> Result<(), PersistError> {
        self.inner
            .persistence
            .save_with(move || async move {
                PersistedState::from(&self.inner.shared.read().await.canvas)
            })
            .await
    }

    pub async fn refresh_stats(&self) {
        let now = self.now_ms();
        let snapshot = {
            let shared = self.inner.shared.read().await;
            stats::compute(
                shared
                    .sessions
                    .values()
                    .map(|s| (s.label.as_str(), s.last_placed_at)),
                shared.canvas.total_pixels_placed(),
                now,
                self.inner.activity_window_ms,
            )
        };
        *self.inner.stats.write().await = snapshot;
    }

    pub async fn stats(&self) -> UsageSnapshot {
        self.inner.stats.read().await.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.shared.read().await.sessions.len()
    }

    pub async fn total_pixels_placed(&self) -> u64 {
        self.inner.shared.read().await.canvas.total_pixels_placed()
    }

    pub async fn current(&self) -> CanvasVersion {
        self.inner.shared.read().await.canvas.current().clone()
    }

    pub async fn map_view(&self) -> MapView {
        let shared = self.inner.shared.read().await;
        MapView {
            current: shared.canvas.current().clone(),
            recent: shared.canvas.recent(self.inner.recent_history),
        }
    }

    pub async fn session_label(&self, id: SessionId) -> Option<String> {
        let shared = self.inner.shared.read().await;
        shared.sessions.get(&id).map(|s| s.label.clone())
    }
}
