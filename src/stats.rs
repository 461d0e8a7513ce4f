//! Periodic usage snapshot, recomputed from a full scan of live sessions.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::config::DEFAULT_LABEL;
use crate::hub::Hub;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub active_labeled_count: usize,
    pub raw_connection_count: usize,
    pub label_histogram: BTreeMap<String, usize>,
    pub total_pixels_placed: u64,
    pub timestamp: i64,
}

/// Scans `(label, last_placed_at)` pairs. A session is recent when it placed
/// at or after `now - window_ms`.
pub fn compute<'a>(
    sessions: impl IntoIterator<Item = (&'a str, i64)>,
    total_pixels_placed: u64,
    now: i64,
    window_ms: i64,
) -> UsageSnapshot {
    let threshold = now - window_ms;
    let mut snapshot = UsageSnapshot {
        total_pixels_placed,
        timestamp: now,
        ..UsageSnapshot::default()
    };
    for (label, last_placed_at) in sessions {
        snapshot.raw_connection_count += 1;
        if last_placed_at < threshold {
            continue;
        }
        if label != DEFAULT_LABEL {
            snapshot.active_labeled_count += 1;
        }
        *snapshot
            .label_histogram
            .entry(label.to_string())
            .or_insert(0) += 1;
    }
    snapshot
}

/// Refreshes the hub's snapshot every `interval` until `stop` fires.
pub async fn run_ticker(hub: Hub, interval: Duration, stop: triggered::Listener) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => hub.refresh_stats().await,
            _ = stop.clone() => break,
        }
    }
}
