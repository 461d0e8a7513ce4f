use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LABEL: &str = "unknown";
const MAX_LABEL_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub password: String,
    pub canvas: CanvasGeometry,
    pub cooldown: Duration,
    pub activity_window: Duration,
    pub stats_interval: Duration,
    pub persist_interval: Duration,
    pub labels: LabelPolicy,
    pub recent_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_addr: SocketAddr::from(([127, 0, 0, 1], 3988)),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3987)),
            data_dir: PathBuf::from("."),
            password: String::new(),
            canvas: CanvasGeometry::default(),
            cooldown: Duration::from_secs(20),
            activity_window: Duration::from_secs(20 * 60),
            stats_interval: Duration::from_secs(1),
            persist_interval: Duration::from_secs(15 * 60),
            labels: LabelPolicy::default(),
            recent_history: 10,
        }
    }
}

impl Config {
    pub fn maps_dir(&self) -> PathBuf {
        self.data_dir.join("maps")
    }

    pub fn orders_dir(&self) -> PathBuf {
        self.data_dir.join("orders")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("data.json")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        Self {
            width: 2000,
            height: 3000,
        }
    }
}

impl CanvasGeometry {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        (0..i64::from(self.width)).contains(&x) && (0..i64::from(self.height)).contains(&y)
    }
}

/// Which client labels a `brand` message may set.
#[derive(Debug, Clone, Default)]
pub enum LabelPolicy {
    /// Any short label made of ASCII letters, digits, `-`, `_` or `.`.
    #[default]
    WellFormed,
    AllowList(HashSet<String>),
}

impl LabelPolicy {
    pub fn from_list(labels: Vec<String>) -> Self {
        if labels.is_empty() {
            LabelPolicy::WellFormed
        } else {
            LabelPolicy::AllowList(labels.into_iter().collect())
        }
    }

    pub fn accepts(&self, label: &str) -> bool {
        if label.is_empty() || label == DEFAULT_LABEL {
            return false;
        }
        match self {
            LabelPolicy::WellFormed => {
                label.len() <= MAX_LABEL_LEN
                    && label
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            }
            LabelPolicy::AllowList(allowed) => allowed.contains(label),
        }
    }
}
