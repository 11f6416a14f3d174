pub mod calendar;
pub mod config;
pub mod config_loader;
pub mod freshness;
pub mod types;

pub use calendar::{session_at, MarketSession, DEFAULT_UTC_OFFSET_HOURS};
pub use config::{AppConfig, FetchConfig, MarketConfig, PicklistConfig, StoreConfig};
pub use config_loader::ConfigLoader;
pub use freshness::FreshnessPolicy;
pub use types::{JobHandle, Ohlcv};
