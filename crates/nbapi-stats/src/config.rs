//! Configuration file support.
//!
//! Loads and validates the statistics layer configuration from TOML.
//! Default location: /etc/nbapi/nbapi-stats.toml
//!
//! ```toml
//! [service]
//! unix_path = "/var/run/switch-state.sock"
//! connect_timeout_ms = 3000
//!
//! [exchange]
//! response_timeout_ms = 5000   # 0 waits forever
//!
//! [flows]
//! initial_capacity = 64
//! ```

use crate::error::{NbResult, NbStatsError};
use crate::flow::FLOW_INFO_LEN;
use crate::wire::{AUX_HEADER_LEN, HEADER_LEN, MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nbapi/nbapi-stats.toml";

/// How to reach the switch-state service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unix socket path of the service
    #[serde(default)]
    pub unix_path: Option<PathBuf>,

    /// TCP address (`host:port`) of the service
    #[serde(default)]
    pub tcp_addr: Option<String>,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Largest frame accepted from the service
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

/// Request/response exchange settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Bound on every wait for a response, in milliseconds. 0 waits forever.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
}

/// Flow collection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowsConfig {
    /// Records reserved up front for each flow dump
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NbStatsConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub exchange: ExchangeConfig,

    #[serde(default)]
    pub flows: FlowsConfig,
}

// Default functions
fn default_connect_timeout() -> u64 {
    3000
}

fn default_max_frame_len() -> usize {
    MAX_FRAME_LEN
}

fn default_response_timeout() -> u64 {
    5000
}

fn default_initial_capacity() -> usize {
    64
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            unix_path: None,
            tcp_addr: None,
            connect_timeout_ms: default_connect_timeout(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout(),
        }
    }
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
        }
    }
}

impl ServiceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ExchangeConfig {
    /// The response bound, `None` when waits are unbounded.
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_ms > 0).then(|| Duration::from_millis(self.response_timeout_ms))
    }
}

impl NbStatsConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> NbResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            NbStatsError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> NbResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> NbResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| NbStatsError::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values.
    pub fn validate(&self) -> NbResult<()> {
        if self.service.unix_path.is_some() && self.service.tcp_addr.is_some() {
            return Err(NbStatsError::config(
                "service.unix_path and service.tcp_addr are mutually exclusive",
            ));
        }

        if self.service.connect_timeout_ms == 0 {
            return Err(NbStatsError::config(
                "service.connect_timeout_ms must be greater than 0",
            ));
        }

        let min_frame = (HEADER_LEN + FLOW_INFO_LEN).max(AUX_HEADER_LEN);
        if self.service.max_frame_len < min_frame || self.service.max_frame_len > MAX_FRAME_LEN {
            return Err(NbStatsError::config(format!(
                "service.max_frame_len must be between {} and {}",
                min_frame, MAX_FRAME_LEN
            )));
        }

        Ok(())
    }
}
