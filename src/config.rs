//! Bridge configuration
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial file still yields a usable configuration. Command line flags are
//! applied on top by the binary.
//!
//! ```toml
//! [publisher]
//! addr = "127.0.0.1:9000"
//! index = 0
//! interval_ms = 20
//! hz = 0            # > 0 overrides interval_ms
//!
//! [receiver]
//! read_timeout_ms = 500
//! recv_buffer_size = 65507
//! subscriber_capacity = 64
//!
//! [[receiver.devices]]
//! id = "udp0"
//! name = "Remote Gamepad"
//! bind = "0.0.0.0:9000"
//! ```

use crate::device::UdpGamepadSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CONFIG_DIR: &str = "gamepad-bridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub publisher: PublisherConfig,
    pub receiver: ReceiverConfig,
}

/// Sending side: which local joystick goes where, and how often
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PublisherConfig {
    /// UDP address frames are sent to
    pub addr: String,
    /// Joystick index as printed by `list`
    pub index: usize,
    pub interval_ms: u64,
    /// Polling rate; overrides `interval_ms` when greater than zero
    pub hz: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9000".to_string(),
            index: 0,
            interval_ms: 20,
            hz: 0,
        }
    }
}

impl PublisherConfig {
    /// Effective sampling interval
    pub fn interval(&self) -> Duration {
        if self.hz > 0 {
            // Rates above 1 kHz are clamped like interval_ms
            (Duration::from_secs(1) / self.hz).max(Duration::from_millis(1))
        } else {
            Duration::from_millis(self.interval_ms.max(1))
        }
    }
}

/// Receiving side: the remote devices to open
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ReceiverConfig {
    pub read_timeout_ms: u64,
    pub recv_buffer_size: usize,
    pub subscriber_capacity: usize,
    pub devices: Vec<RemoteDeviceConfig>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        let gamepad = UdpGamepadSettings::default();
        Self {
            read_timeout_ms: gamepad.read_timeout_ms,
            recv_buffer_size: gamepad.recv_buffer_size,
            subscriber_capacity: crate::device::registry::DEFAULT_SUBSCRIBER_CAPACITY,
            devices: vec![RemoteDeviceConfig {
                id: "udp0".to_string(),
                name: "Remote Gamepad".to_string(),
                bind: "0.0.0.0:9000".to_string(),
            }],
        }
    }
}

impl ReceiverConfig {
    pub fn gamepad_settings(&self) -> UdpGamepadSettings {
        UdpGamepadSettings {
            read_timeout_ms: self.read_timeout_ms,
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}

/// One remote device endpoint
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoteDeviceConfig {
    pub id: String,
    pub name: String,
    pub bind: String,
}

impl BridgeConfig {
    /// `<config dir>/gamepad-bridge/config.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads the configuration
    ///
    /// An explicit `path` must exist. Without one the default location is
    /// tried, and a missing default file falls back to built-in defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(path) = Self::default_path() else {
                    info!("No config directory available, using defaults");
                    return Ok(Self::default());
                };
                let exists = tokio::fs::try_exists(&path)
                    .await
                    .map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                if !exists {
                    info!("No config file at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        info!("Loaded config from {}", path.display());
        debug!("Config: {:?}", config);
        Ok(config)
    }
}
