//! Durable snapshot of the canvas history and counters.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::canvas::{CanvasState, CanvasVersion, BLANK_ORDERS};
use crate::hub::Hub;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("state file i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("state file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk layout of `data.json`. Every field is optional when reading so a
/// partial or older file still loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub current_map: Option<String>,
    pub current_orders: Option<String>,
    pub map_history: Vec<CanvasVersion>,
    pub order_length: usize,
    pub pixels_placed: u64,
}

impl From<&CanvasState> for PersistedState {
    fn from(state: &CanvasState) -> Self {
        let current = state.current();
        Self {
            current_map: Some(current.image.clone()),
            current_orders: Some(current.orders.clone()),
            map_history: state.history().to_vec(),
            order_length: current.order_length,
            pixels_placed: state.total_pixels_placed(),
        }
    }
}

impl PersistedState {
    pub fn into_canvas(mut self) -> CanvasState {
        if self.map_history.is_empty() {
            if let Some(image) = self.current_map.clone() {
                self.map_history.push(CanvasVersion {
                    image,
                    orders: String::new(),
                    order_length: 0,
                    ..CanvasVersion::init()
                });
            }
        }
        if let Some(last) = self.map_history.last_mut() {
            if last.orders.is_empty() {
                last.orders = self
                    .current_orders
                    .clone()
                    .unwrap_or_else(|| BLANK_ORDERS.to_string());
            }
            if last.order_length == 0 {
                last.order_length = self.order_length;
            }
        }
        CanvasState::restore(self.map_history, self.pixels_placed)
    }
}

/// Reads and writes the state file. Saves are serialized with each other.
#[derive(Debug)]
pub struct Persistence {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a first run, not an error.
    pub async fn load(&self) -> Result<CanvasState, PersistError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved state, starting fresh");
                return Ok(CanvasState::default());
            }
            Err(err) => return Err(err.into()),
        };
        let stored: PersistedState = serde_json::from_slice(&bytes)?;
        Ok(stored.into_canvas())
    }

    pub async fn save(&self, state: &PersistedState) -> Result<(), PersistError> {
        self.save_with(move || async move { state.clone() }).await
    }

    /// Takes the snapshot only once this save holds the write lock, so saves
    /// land on disk in the order their snapshots were taken.
    pub async fn save_with<F, Fut>(&self, snapshot: F) -> Result<(), PersistError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PersistedState>,
    {
        let _guard = self.write_lock.lock().await;
        let bytes = serde_json::to_vec(&snapshot().await)?;
        self.write(&bytes).await
    }

    /// Writes to a sibling temp file and renames it over the old state.
    async fn write(&self, bytes: &[u8]) -> Result<(), PersistError> {
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "saved state");
        Ok(())
    }
}

/// Saves the hub's state every `interval` until `stop` fires.
pub async fn run_ticker(hub: Hub, interval: Duration, stop: triggered::Listener) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; state was just loaded.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = hub.persist().await {
                    error!("periodic save failed: {err}");
                }
            }
            _ = stop.clone() => break,
        }
    }
}
