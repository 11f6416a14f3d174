use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by layering a TOML file and
    /// `STOCK_TRACK_`-prefixed environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be parsed or a
    /// value fails to deserialize.
    pub fn load(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("STOCK_TRACK_").split("__"))
            .extract()?;

        Ok(config)
    }
}
