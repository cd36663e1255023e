//! Server configuration

use anyhow::{Context, Result};
use lithium_dispatch::DispatcherConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Environment variable naming the config file when no argument is given
pub const CONFIG_ENV: &str = "LITHIUM_CONFIG";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8600";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    pub listen_addr: String,
    pub dispatcher: DispatcherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the file named by the first argument or `LITHIUM_CONFIG`,
    /// falling back to defaults when neither is set
    pub fn load() -> Result<Self> {
        let path = std::env::args()
            .nth(1)
            .or_else(|| std::env::var(CONFIG_ENV).ok());

        match path {
            Some(path) => Self::from_file(&path),
            None => {
                info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.dispatcher.validate()?;
        Ok(config)
    }
}
