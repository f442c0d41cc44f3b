//! Runtime tunables.
//!
//! Every cadence, retry count and safety maximum used by the session worker, the
//! scatter reader and the entity resolver lives here. Values deserialize from any
//! serde format; the CLI reads them from TOML.
//!
//! ```ignore
//! use std::time::Duration;
//! use tether::TetherConfig;
//!
//! let config = TetherConfig::builder()
//!     .refresh_interval(Duration::from_millis(100))
//!     .eviction_debounce(3)
//!     .build();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::process::layout::{limits, timing};

/// Configuration for the session worker and everything it drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// Pause between refresh cycles while a session is active
    pub refresh_interval_ms: u64,
    /// Consecutive failed liveness probes before the process counts as gone
    pub liveness_attempts: u32,
    /// Spacing between liveness probes
    pub liveness_interval_ms: u64,
    /// First wait between process lookups
    pub locate_interval_ms: u64,
    /// Upper bound for the lookup backoff
    pub locate_max_interval_ms: u64,
    /// Pause after a teardown before locating again
    pub cooldown_ms: u64,
    /// Poll interval while waiting for a session to start
    pub session_poll_interval_ms: u64,
    /// Consecutive registration sweeps an address may be missing before eviction
    pub eviction_debounce: u32,
    /// Reads are coalesced only within one page of this size
    pub page_size: u64,
    /// Largest accepted element count for lists and tables
    pub max_list_count: usize,
    /// Largest accepted text payload in bytes
    pub max_text_bytes: usize,
    /// Minimum spacing between quest log refreshes
    pub quest_refresh_interval_ms: u64,
    /// Write worker cadence while the process is ready
    pub write_active_interval_ms: u64,
    /// Write worker cadence otherwise
    pub write_idle_interval_ms: u64,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: timing::REFRESH_INTERVAL_MS,
            liveness_attempts: timing::LIVENESS_ATTEMPTS,
            liveness_interval_ms: timing::LIVENESS_INTERVAL_MS,
            locate_interval_ms: timing::LOCATE_INTERVAL_MS,
            locate_max_interval_ms: timing::LOCATE_MAX_INTERVAL_MS,
            cooldown_ms: timing::COOLDOWN_MS,
            session_poll_interval_ms: timing::SESSION_POLL_INTERVAL_MS,
            eviction_debounce: 2,
            page_size: limits::PAGE_SIZE,
            max_list_count: limits::MAX_LIST_COUNT,
            max_text_bytes: limits::MAX_TEXT_BYTES,
            quest_refresh_interval_ms: timing::QUEST_REFRESH_INTERVAL_MS,
            write_active_interval_ms: timing::WRITE_ACTIVE_INTERVAL_MS,
            write_idle_interval_ms: timing::WRITE_IDLE_INTERVAL_MS,
        }
    }
}

impl TetherConfig {
    /// Create a new configuration builder
    pub fn builder() -> TetherConfigBuilder {
        TetherConfigBuilder::default()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn locate_interval(&self) -> Duration {
        Duration::from_millis(self.locate_interval_ms)
    }

    pub fn locate_max_interval(&self) -> Duration {
        Duration::from_millis(self.locate_max_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn session_poll_interval(&self) -> Duration {
        Duration::from_millis(self.session_poll_interval_ms)
    }

    pub fn quest_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.quest_refresh_interval_ms)
    }

    pub fn write_active_interval(&self) -> Duration {
        Duration::from_millis(self.write_active_interval_ms)
    }

    pub fn write_idle_interval(&self) -> Duration {
        Duration::from_millis(self.write_idle_interval_ms)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for TetherConfig
#[derive(Debug, Clone, Default)]
pub struct TetherConfigBuilder {
    refresh_interval: Option<Duration>,
    liveness_attempts: Option<u32>,
    liveness_interval: Option<Duration>,
    locate_interval: Option<Duration>,
    locate_max_interval: Option<Duration>,
    cooldown: Option<Duration>,
    session_poll_interval: Option<Duration>,
    eviction_debounce: Option<u32>,
    max_list_count: Option<usize>,
    max_text_bytes: Option<usize>,
    quest_refresh_interval: Option<Duration>,
}

impl TetherConfigBuilder {
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Set how many probes in a row must fail before the process counts as lost
    pub fn liveness(mut self, attempts: u32, interval: Duration) -> Self {
        self.liveness_attempts = Some(attempts);
        self.liveness_interval = Some(interval);
        self
    }

    /// Set the process lookup backoff range
    pub fn locate_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.locate_interval = Some(initial);
        self.locate_max_interval = Some(max);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    pub fn session_poll_interval(mut self, interval: Duration) -> Self {
        self.session_poll_interval = Some(interval);
        self
    }

    pub fn eviction_debounce(mut self, misses: u32) -> Self {
        self.eviction_debounce = Some(misses);
        self
    }

    pub fn max_list_count(mut self, max: usize) -> Self {
        self.max_list_count = Some(max);
        self
    }

    pub fn max_text_bytes(mut self, max: usize) -> Self {
        self.max_text_bytes = Some(max);
        self
    }

    pub fn quest_refresh_interval(mut self, interval: Duration) -> Self {
        self.quest_refresh_interval = Some(interval);
        self
    }

    /// Build the configuration
    pub fn build(self) -> TetherConfig {
        let default = TetherConfig::default();
        TetherConfig {
            refresh_interval_ms: self
                .refresh_interval
                .map_or(default.refresh_interval_ms, millis),
            liveness_attempts: self.liveness_attempts.unwrap_or(default.liveness_attempts),
            liveness_interval_ms: self
                .liveness_interval
                .map_or(default.liveness_interval_ms, millis),
            locate_interval_ms: self
                .locate_interval
                .map_or(default.locate_interval_ms, millis),
            locate_max_interval_ms: self
                .locate_max_interval
                .map_or(default.locate_max_interval_ms, millis),
            cooldown_ms: self.cooldown.map_or(default.cooldown_ms, millis),
            session_poll_interval_ms: self
                .session_poll_interval
                .map_or(default.session_poll_interval_ms, millis),
            eviction_debounce: self
                .eviction_debounce
                .unwrap_or(default.eviction_debounce)
                .max(1),
            max_list_count: self.max_list_count.unwrap_or(default.max_list_count),
            max_text_bytes: self.max_text_bytes.unwrap_or(default.max_text_bytes),
            quest_refresh_interval_ms: self
                .quest_refresh_interval
                .map_or(default.quest_refresh_interval_ms, millis),
            ..default
        }
    }
}
