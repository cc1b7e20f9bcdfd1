//! Channel configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings shared by every channel a client opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Device type accepted from discovery (default: `tiqi.devil.channel`).
    pub device_type: String,
    /// Major protocol version this client speaks (default: 2).
    pub supported_major_version: u64,
    /// Transport scheme used to build endpoints (default: `tcp`).
    pub endpoint_scheme: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            device_type: "tiqi.devil.channel".to_string(),
            supported_major_version: 2,
            endpoint_scheme: "tcp".to_string(),
        }
    }
}

impl ChannelConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| Error::Config(e.to_string())),
            "json" => serde_json::from_str(&contents).map_err(|e| Error::Config(e.to_string())),
            _ => Err(Error::Config(format!(
                "unsupported config file extension: {ext}"
            ))),
        }
    }

    /// Endpoint address of `port` on `host`.
    pub fn endpoint(&self, host: &str, port: u16) -> String {
        if host.contains(':') && !host.starts_with('[') {
            format!("{}://[{}]:{}", self.endpoint_scheme, host, port)
        } else {
            format!("{}://{}:{}", self.endpoint_scheme, host, port)
        }
    }
}
