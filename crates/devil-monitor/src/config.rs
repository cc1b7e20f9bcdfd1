use devil_channel::{ChannelConfig, DeviceProfile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub host: String,
    pub port: u16,
    pub dev_id: Option<String>,
    pub streams: Vec<u16>,
    pub window: usize,
    pub log_filter: String,
    pub profile: Option<PathBuf>,
    pub channel: ChannelConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 5000,
            dev_id: None,
            streams: vec![0],
            window: 65536,
            log_filter: String::from("info"),
            profile: None,
            channel: ChannelConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        load(path)
    }

    /// Profile from the configured file, or the built-in EVIL 2 profile.
    pub fn device_profile(&self) -> anyhow::Result<DeviceProfile> {
        let Some(path) = &self.profile else {
            return Ok(DeviceProfile::evil2());
        };
        load(path)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window == 0 {
            anyhow::bail!("statistics window must not be empty");
        }
        if self.host.is_empty() {
            anyhow::bail!("no device host configured");
        }
        Ok(())
    }
}

/// Deserialize a `.toml` or `.json` file.
pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    match ext.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(&contents)?),
        "json" => Ok(serde_json::from_str(&contents)?),
        _ => anyhow::bail!("Unsupported config file extension: {}", ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 5000);
        assert_eq!(config.streams, vec![0]);
        assert_eq!(config.window, 65536);
        assert_eq!(config.log_filter, "info");
        assert!(config.profile.is_none());
        assert_eq!(config.channel.supported_major_version, 2);
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
host = "10.0.0.5"
streams = [0, 2]
window = 1024

[channel]
device_type = "lab.devil"
"#
        )
        .unwrap();
        let config = MonitorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.streams, vec![0, 2]);
        assert_eq!(config.window, 1024);
        assert_eq!(config.port, 5000);
        assert_eq!(config.channel.device_type, "lab.devil");
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, r#"{{"port": 6100, "dev_id": "evil-7"}}"#).unwrap();
        let config = MonitorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 6100);
        assert_eq!(config.dev_id.as_deref(), Some("evil-7"));
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        assert!(MonitorConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_device_profile() {
        let mut config = MonitorConfig::default();
        assert_eq!(config.device_profile().unwrap().name, "evil2");

        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"name": "bench", "registers": [{{"name": "gain", "index": 3, "signed": true}}],
                "control_register": null, "condition_register": null}}"#
        )
        .unwrap();
        config.profile = Some(file.path().to_path_buf());
        let profile = config.device_profile().unwrap();
        assert_eq!(profile.name, "bench");
        assert!(profile.registers[0].signed);
    }

    #[test]
    fn test_device_profile_from_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
name = "bench"

[[registers]]
name = "gain"
index = 3
"#
        )
        .unwrap();
        let config = MonitorConfig {
            profile: Some(file.path().to_path_buf()),
            ..MonitorConfig::default()
        };
        let profile = config.device_profile().unwrap();
        assert_eq!(profile.registers[0].index, 3);
        assert!(profile.control_register.is_none());
    }

    #[test]
    fn test_device_profile_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".ini").unwrap();
        let config = MonitorConfig {
            profile: Some(file.path().to_path_buf()),
            ..MonitorConfig::default()
        };
        assert!(config.device_profile().is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        config.window = 0;
        assert!(config.validate().is_err());
    }
}
