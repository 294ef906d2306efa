use std::path::Path;

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::constants::{
    CONNECT_RETRY_DELAY_MS, DEFAULT_SCAN_TIMEOUT_SECS, DISCOVERY_DELAY_MS, MAX_CONNECT_RETRIES,
};

const CONFIG_FILE_NAME: &str = "profile_config.json";

/// Per-peripheral capabilities and connection tuning.
///
/// Profile revisions differ in how the AICS control point is framed,
/// so the framing is a capability of the target peripheral rather than
/// a constant of the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Whether control-point commands carry the AICS change counter.
    /// Peripherals that broadcast no counter expect bare opcodes.
    pub control_point_change_counter: bool,

    /// Write characteristics with response (acknowledged) rather than
    /// without.
    pub write_with_response: bool,

    /// Settle time between the connection callback and service
    /// discovery. Some stacks drop a discovery request issued straight
    /// from the connection callback.
    pub discovery_delay_ms: u64,

    /// How long to scan when resolving a peripheral by address.
    pub scan_timeout_secs: u64,

    /// Retry budget for the initial link establishment. Queued GATT
    /// operations are never retried.
    pub connect_max_retries: u32,
    pub connect_retry_delay_ms: u64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            control_point_change_counter: false,
            write_with_response: true,
            discovery_delay_ms: DISCOVERY_DELAY_MS,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            connect_max_retries: MAX_CONNECT_RETRIES,
            connect_retry_delay_ms: CONNECT_RETRY_DELAY_MS,
        }
    }
}

impl ProfileConfig {
    /// Loads the config from a configuration file, falling back to the
    /// defaults when the file does not exist.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);

        if !file_path.exists() {
            warn!("Config file not found at {file_path:?}, using default.");
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {file_path:?}");
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        fs::create_dir_all(config_dir).await?;
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let config_json = serde_json::to_string_pretty(self)?;
        fs::write(&file_path, config_json).await?;

        info!("Profile config saved to {file_path:?}.");
        Ok(())
    }
}
