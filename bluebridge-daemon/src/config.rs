use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub listen: String,
    pub settings_file: String,
    pub bluetooth: BluetoothConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Controller the device hangs off, as it appears in bus paths
    pub adapter: String,
    /// Media player node under the device path
    pub player: String,
    pub auto_refresh: bool,
    pub refresh_interval_ms: u64,
    /// Pause between turning scan on and issuing Connect
    pub connect_delay_secs: u64,
    pub tmux_session: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: "hci0".to_string(),
            player: "player0".to_string(),
            auto_refresh: true,
            refresh_interval_ms: 1000,
            connect_delay_secs: 13,
            tmux_session: "bluetoothConnect".to_string(),
        }
    }
}

impl BluetoothConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_secs(self.connect_delay_secs)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5353".to_string(),
            settings_file: "/var/lib/bluebridge/settings.json".to_string(),
            bluetooth: BluetoothConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Create default config if not found
                let config = Self::default();
                tracing::warn!(
                    "No config at {}, writing defaults",
                    path.display()
                );
                if let Err(e) = fs::write(path, toml::to_string_pretty(&config)?) {
                    tracing::warn!("Could not write default config: {}", e);
                }
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }
}
