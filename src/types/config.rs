use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the tab-group core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// Wait after creating a bootstrap tab before computing the hide set.
    pub settle_delay_ms: u64,
    /// Coalescing window for "groups changed" notifications.
    pub broadcast_debounce_ms: u64,
    pub session_save_interval_secs: u64,
    /// Sessions older than this are flagged stale (advisory only).
    pub stale_session_days: u64,
    pub default_group_name: String,
    /// URLs starting with any of these can never be hidden or persisted.
    pub privileged_url_prefixes: Vec<String>,
    pub data_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 300,
            broadcast_debounce_ms: 50,
            session_save_interval_secs: 60,
            stale_session_days: 7,
            default_group_name: "Default".to_string(),
            privileged_url_prefixes: Self::default_privileged_prefixes(),
            data_dir: None,
        }
    }
}

impl CoreConfig {
    pub fn default_privileged_prefixes() -> Vec<String> {
        [
            "about:",
            "chrome:",
            "chrome-extension:",
            "moz-extension:",
            "resource:",
            "view-source:",
            "data:",
            "file:",
            "javascript:",
            "edge:",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn broadcast_debounce(&self) -> Duration {
        Duration::from_millis(self.broadcast_debounce_ms)
    }

    pub fn session_save_interval(&self) -> Duration {
        Duration::from_secs(self.session_save_interval_secs)
    }

    pub fn stale_session_after(&self) -> Duration {
        Duration::from_secs(self.stale_session_days.saturating_mul(24 * 60 * 60))
    }

    /// Config suited to tests: no settle delay, no debounce.
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            broadcast_debounce_ms: 0,
            ..Self::default()
        }
    }
}
