use serde::{Deserialize, Serialize};

/// Configuration for the Paylane engine and node.
///
/// Every field has a default, so a partial TOML file is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node display name.
    pub name: String,
    /// Path to the data directory.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Minimum channel deposit in atomic units.
    pub min_deposit: u128,
    /// Maximum channel deposit in atomic units.
    pub max_deposit: u128,
    /// Interval between stream flush sweeps (seconds).
    pub flush_interval_secs: u64,
    /// Interval between durable state snapshots (seconds).
    pub snapshot_interval_secs: u64,
    /// Timeout applied to the external settlement call (seconds).
    pub settle_timeout_secs: u64,
    /// Rolling window for device monthly caps (days).
    pub cap_window_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "paylane-node".into(),
            data_dir: "./data".into(),
            log_level: "info".into(),
            min_deposit: 1,
            max_deposit: u128::MAX,
            flush_interval_secs: 10,
            snapshot_interval_secs: 30,
            settle_timeout_secs: 30,
            cap_window_days: 30,
        }
    }
}
