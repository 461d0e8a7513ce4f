//! The active target and the log of every target that came before it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of the synthetic first entry a fresh install starts with.
pub const INIT_DATE_MS: i64 = 1_648_890_843_309;
pub const BLANK_MAP: &str = "blank.png";
pub const BLANK_ORDERS: &str = "blank.json";

/// One accepted target. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasVersion {
    #[serde(rename = "file")]
    pub image: String,
    #[serde(default)]
    pub orders: String,
    #[serde(rename = "orderLength", default)]
    pub order_length: usize,
    #[serde(rename = "date")]
    pub created_at: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub uploader: Option<String>,
}

impl CanvasVersion {
    pub fn init() -> Self {
        Self {
            image: BLANK_MAP.to_string(),
            orders: BLANK_ORDERS.to_string(),
            order_length: 0,
            created_at: INIT_DATE_MS,
            reason: "Init".to_string(),
            uploader: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasState {
    current: CanvasVersion,
    history: Vec<CanvasVersion>,
    total_pixels_placed: u64,
}

impl Default for CanvasState {
    fn default() -> Self {
        let init = CanvasVersion::init();
        Self {
            current: init.clone(),
            history: vec![init],
            total_pixels_placed: 0,
        }
    }
}

impl CanvasState {
    /// Rebuilds state from a stored history. The last entry becomes current;
    /// an empty history falls back to the init entry.
    pub fn restore(history: Vec<CanvasVersion>, total_pixels_placed: u64) -> Self {
        match history.last().cloned() {
            Some(current) => Self {
                current,
                history,
                total_pixels_placed,
            },
            None => Self {
                total_pixels_placed,
                ..Self::default()
            },
        }
    }

    pub fn current(&self) -> &CanvasVersion {
        &self.current
    }

    pub fn history(&self) -> &[CanvasVersion] {
        &self.history
    }

    pub fn total_pixels_placed(&self) -> u64 {
        self.total_pixels_placed
    }

    /// Makes `version` current and appends it to history. A version dated
    /// before the last entry is clamped so history stays ordered.
    pub fn apply(&mut self, mut version: CanvasVersion) {
        if let Some(last) = self.history.last() {
            version.created_at = version.created_at.max(last.created_at);
        }
        self.current = version.clone();
        self.history.push(version);
    }

    pub fn record_placement(&mut self) -> u64 {
        self.total_pixels_placed += 1;
        self.total_pixels_placed
    }

    /// The newest `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CanvasVersion> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// RFC 3339 rendering of a millisecond timestamp, in UTC.
pub fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(image: &str, created_at: i64) -> CanvasVersion {
        CanvasVersion {
            image: image.to_string(),
            orders: image.replace(".png", ".json"),
            order_length: 3,
            created_at,
            reason: "test".to_string(),
            uploader: None,
        }
    }

    #[test]
    fn default_state_is_seeded_with_init_entry() {
        let state = CanvasState::default();
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.current(), &state.history()[0]);
        assert_eq!(state.current().image, BLANK_MAP);
        assert_eq!(state.total_pixels_placed(), 0);
    }

    #[test]
    fn apply_keeps_history_tail_equal_to_current() {
        let mut state = CanvasState::default();
        state.apply(version("a.png", INIT_DATE_MS + 10));
        state.apply(version("b.png", INIT_DATE_MS + 20));
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.history().last(), Some(state.current()));
        assert_eq!(state.current().image, "b.png");
    }

    #[test]
    fn apply_clamps_out_of_order_timestamps() {
        let mut state = CanvasState::default();
        state.apply(version("a.png", INIT_DATE_MS + 50));
        state.apply(version("b.png", INIT_DATE_MS + 10));
        let dates: Vec<_> = state.history().iter().map(|v| v.created_at).collect();
        assert!(dates.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let mut state = CanvasState::default();
        for i in 0..5 {
            state.apply(version(&format!("{}.png", i), INIT_DATE_MS + i));
        }
        let recent: Vec<_> = state.recent(2).into_iter().map(|v| v.image).collect();
        assert_eq!(recent, vec!["4.png", "3.png"]);
        assert_eq!(state.recent(100).len(), 6);
    }

    #[test]
    fn restore_from_empty_history_uses_init() {
        let state = CanvasState::restore(Vec::new(), 42);
        assert_eq!(state.current(), &CanvasVersion::init());
        assert_eq!(state.total_pixels_placed(), 42);
    }

    #[test]
    fn counter_is_monotonic() {
        let mut state = CanvasState::default();
        assert_eq!(state.record_placement(), 1);
        assert_eq!(state.record_placement(), 2);
    }

    #[test]
    fn formats_as_utc() {
        assert_eq!(format_ms(INIT_DATE_MS), "2022-04-02T09:14:03.309Z");
    }
}
