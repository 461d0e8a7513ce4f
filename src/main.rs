use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use placehub::clock::SystemClock;
use placehub::config::{CanvasGeometry, Config, LabelPolicy};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// placehub - shared canvas coordination server
#[derive(Parser, Debug)]
#[command(name = "placehub")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address for the HTTP endpoints
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:3987")]
    http_addr: SocketAddr,

    /// Address for the WebSocket channel (served at /api/ws)
    #[arg(long, env = "WS_ADDR", default_value = "0.0.0.0:3988")]
    ws_addr: SocketAddr,

    /// Directory holding data.json, maps/ and orders/
    #[arg(long, env = "DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Password required to upload a new target
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, default_value_t = 2000)]
    width: u32,

    #[arg(long, default_value_t = 3000)]
    height: u32,

    /// Minimum seconds between accepted placements from one client
    #[arg(long, default_value_t = 20)]
    cooldown_secs: u64,

    /// A client counts as active if it placed within this many seconds
    #[arg(long, default_value_t = 20 * 60)]
    activity_window_secs: u64,

    #[arg(long, default_value_t = 1)]
    stats_interval_secs: u64,

    #[arg(long, default_value_t = 15 * 60)]
    persist_interval_secs: u64,

    /// Accepted client brand labels; any well-formed label if none given
    #[arg(long = "brand")]
    brands: Vec<String>,

    /// Number of history entries returned by /api/map
    #[arg(long, default_value_t = 10)]
    recent_history: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            ws_addr: self.ws_addr,
            http_addr: self.http_addr,
            data_dir: self.data_dir.clone(),
            password: self.password.clone(),
            canvas: CanvasGeometry {
                width: self.width,
                height: self.height,
            },
            cooldown: Duration::from_secs(self.cooldown_secs),
            activity_window: Duration::from_secs(self.activity_window_secs),
            stats_interval: Duration::from_secs(self.stats_interval_secs.max(1)),
            persist_interval: Duration::from_secs(self.persist_interval_secs.max(1)),
            labels: LabelPolicy::from_list(self.brands.clone()),
            recent_history: self.recent_history,
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    if args.password.is_empty() {
        warn!("empty password configured, updates will always be rejected");
    }

    let running = placehub::app::start(args.config(), Arc::new(SystemClock)).await?;
    info!(
        ws = %running.ws_addr,
        http = %running.http_addr,
        "server started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("ctrl-c received, shutting down");
    running.shutdown().await;
    Ok(())
}
