//! Wires the hub, the listeners and the periodic tasks together.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::artifacts::ArtifactStore;
use crate::clock::Clock;
use crate::config::Config;
use crate::http::{self, AppState};
use crate::hub::Hub;
use crate::persist::{self, Persistence};
use crate::update::Updater;
use crate::{server, stats};

pub struct Running {
    pub ws_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub hub: Hub,
    shutdown: triggered::Trigger,
    tasks: Vec<JoinHandle<()>>,
}

/// Loads saved state, binds both listeners and spawns every task.
pub async fn start(config: Config, clock: Arc<dyn Clock>) -> Result<Running> {
    let persistence = Persistence::new(config.state_file());
    let canvas = persistence
        .load()
        .await
        .with_context(|| format!("failed to load {}", config.state_file().display()))?;
    info!(
        current = %canvas.current().image,
        history = canvas.history().len(),
        pixels_placed = canvas.total_pixels_placed(),
        "loaded canvas state"
    );

    let artifacts = ArtifactStore::new(config.maps_dir(), config.orders_dir());
    artifacts
        .prepare()
        .await
        .context("failed to create artifact directories")?;

    let hub = Hub::new(&config, canvas, persistence, clock);
    let updater = Updater::new(hub.clone(), artifacts, config.password.clone());

    let ws_listener = TcpListener::bind(config.ws_addr)
        .await
        .with_context(|| format!("failed to bind websocket listener on {}", config.ws_addr))?;
    let http_listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind http listener on {}", config.http_addr))?;
    let ws_addr = ws_listener.local_addr()?;
    let http_addr = http_listener.local_addr()?;

    let (shutdown, stop) = triggered::trigger();
    let router = http::router(Arc::new(AppState {
        hub: hub.clone(),
        updater,
    }));
    let http_stop = stop.clone();
    let tasks = vec![
        tokio::spawn(server::serve(ws_listener, hub.clone(), stop.clone())),
        tokio::spawn(async move {
            info!("http listening on http://{}", http_addr);
            if let Err(err) = axum::serve(http_listener, router)
                .with_graceful_shutdown(http_stop)
                .await
            {
                error!("http server failed: {err}");
            }
        }),
        tokio::spawn(stats::run_ticker(
            hub.clone(),
            config.stats_interval,
            stop.clone(),
        )),
        tokio::spawn(persist::run_ticker(
            hub.clone(),
            config.persist_interval,
            stop,
        )),
    ];

    Ok(Running {
        ws_addr,
        http_addr,
        hub,
        shutdown,
        tasks,
    })
}

impl Running {
    /// Stops accepting work, waits for the tasks and writes a final save.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            let _ = task.await;
        }
        if let Err(err) = self.hub.persist().await {
            error!("final save failed: {err}");
        }
        info!("shut down");
    }
}
