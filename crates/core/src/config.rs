use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::calendar::DEFAULT_UTC_OFFSET_HOURS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub market: MarketConfig,
    pub fetch: FetchConfig,
    pub picklist: PicklistConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base directory for the durable databases.
    pub data_dir: PathBuf,
    /// Directory for the per-ticker quote cache.
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Fixed local-time offset from UTC, in hours. Not DST-aware.
    pub utc_offset_hours: i32,
    /// Maximum cache age while the market is open, in seconds.
    pub max_quote_age_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub base_url: String,
    /// Fixed delay between retries of a transient fetch failure.
    pub retry_backoff_ms: u64,
    /// How long an acquired fetch session (crumb) stays valid.
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicklistConfig {
    /// How long a picklist entry lives before its deferred removal fires.
    pub expiry_hours: u32,
    /// Command the deferred job invokes; defaults to the current executable.
    pub expire_command: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            store: StoreConfig {
                data_dir: home.join(".stock_track"),
                cache_dir: std::env::temp_dir().join("stock_track_quote_cache"),
            },
            market: MarketConfig {
                utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
                max_quote_age_secs: 300,
            },
            fetch: FetchConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
                retry_backoff_ms: 500,
                session_ttl_hours: 12,
            },
            picklist: PicklistConfig {
                expiry_hours: 24,
                expire_command: None,
            },
        }
    }
}
