//! Configuration loading with sane defaults.
//!
//! Everything runs without a config file; `config.toml` under the platform
//! config directory can override the SDP strings, QoS parameters and input
//! polling behavior.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Strings published in the HID service record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdpConfig {
    pub service_name: String,
    pub service_description: String,
    pub provider: String,
}

impl Default for SdpConfig {
    fn default() -> Self {
        Self {
            service_name: "hidpad Gamepad".to_string(),
            service_description: "Virtual Bluetooth HID Gamepad".to_string(),
            provider: "hidpad".to_string(),
        }
    }
}

/// Quality-of-service parameters for the outgoing interrupt channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Token rate in bytes per second: a 9-byte frame (report id + 8 data
    /// bytes) once per 11250 us latency window.
    pub token_rate: u32,
    pub token_bucket_size: u32,
    pub peak_bandwidth: u32,
    /// Latency in microseconds.
    pub latency: u32,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            token_rate: 800,
            token_bucket_size: 9,
            peak_bandwidth: 0,
            latency: 11250,
        }
    }
}

/// Local gamepad polling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Analog stick deadzone as a fraction of full deflection.
    pub deadzone: f32,
    /// Snapshot interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.05,
            poll_interval_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HidpadConfig {
    pub sdp: SdpConfig,
    pub qos: QosConfig,
    pub input: InputConfig,
}

impl HidpadConfig {
    /// Platform path of the optional config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hidpad").join("config.toml"))
    }

    /// Read the config file, falling back to defaults on any error. A
    /// missing file is the normal case and only logged at debug level.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::config_path() else {
            warn!("no config directory on this platform, using defaults");
            return Self::default();
        };
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("no config file at {}: {e}, using defaults", path.display());
                return Self::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(config) => {
                debug!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("invalid config at {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }
}
