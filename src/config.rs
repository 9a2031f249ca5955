use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Server settings, read from a json file. Missing fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth adapter to use, the default adapter if unset.
    pub adapter: Option<String>,
    /// Name the adapter advertises in the scan response.
    pub device_name: String,
    pub manufacturer: String,
    pub model: String,
    /// Body sensor location reported by the heart rate service.
    pub sensor_location: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            adapter: None,
            device_name: "btserver".to_string(),
            manufacturer: "btserver".to_string(),
            model: env!("CARGO_PKG_VERSION").to_string(),
            // chest
            sensor_location: 1,
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::read(path.as_ref())
            .await
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        serde_json::from_slice(&file).context("failed to parse config")
    }
}
