//! Resource descriptors handed to the client by the discovery service.
//!
//! The broadcast protocol itself lives elsewhere; this module only parses
//! the advertised descriptor tuple and decides which devices to connect to.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use rmpv::Value;
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::ProtocolError;

/// Semantic version advertised by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemVer {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
    /// Pre-release tag, empty if none.
    pub pre_release: String,
    /// Build metadata, empty if none.
    pub build_metadata: String,
}

impl SemVer {
    /// A release version without tags.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: String::new(),
            build_metadata: String::new(),
        }
    }

    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let items = value.as_array().ok_or_else(|| malformed("version is not an array"))?;
        let number = |i: usize| items.get(i).and_then(Value::as_u64);
        let text = |i: usize| {
            items
                .get(i)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(Self {
            major: number(0).ok_or_else(|| malformed("missing major version"))?,
            minor: number(1).ok_or_else(|| malformed("missing minor version"))?,
            patch: number(2).ok_or_else(|| malformed("missing patch version"))?,
            pre_release: text(3),
            build_metadata: text(4),
        })
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if !self.build_metadata.is_empty() {
            write!(f, "+{}", self.build_metadata)?;
        }
        Ok(())
    }
}

/// A device advertised on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Device type, e.g. `tiqi.devil.channel`.
    pub dev_type: String,
    /// Stable device identifier.
    pub dev_id: String,
    /// Name shown to users.
    pub display_name: String,
    /// Protocol version.
    pub version: SemVer,
    /// Base RPC port.
    pub port: u16,
}

impl ResourceDescriptor {
    /// Parse the advertised tuple
    /// `(devType, devId, displayName, version, port, ...reserved)`.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let items = value
            .as_array()
            .ok_or_else(|| malformed("descriptor is not an array"))?;
        if items.len() < 5 {
            return Err(malformed(&format!(
                "expected at least 5 fields, got {}",
                items.len()
            )));
        }
        let text = |i: usize, what: &str| {
            items[i]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| malformed(&format!("{what} is not a string")))
        };
        let port = items[4]
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| malformed("port out of range"))?;
        Ok(Self {
            dev_type: text(0, "device type")?,
            dev_id: text(1, "device id")?,
            display_name: text(2, "display name")?,
            version: SemVer::from_value(&items[3])?,
            port,
        })
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} \"{}\", port {}",
            self.dev_type, self.version, self.dev_id, self.display_name, self.port
        )
    }
}

fn malformed(reason: &str) -> ProtocolError {
    ProtocolError::Malformed {
        what: "resource descriptor",
        reason: reason.to_string(),
    }
}

/// Decision for a newly discovered resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Connect to it.
    Accept,
    /// Not a device this client handles.
    WrongType,
    /// A channel for this device id already exists.
    AlreadyConnected,
    /// Major protocol version not supported.
    UnsupportedVersion(SemVer),
}

/// Tracks which discovered devices currently have a channel.
#[derive(Debug, Clone)]
pub struct DeviceDirectory {
    device_type: String,
    supported_major: u64,
    connected: HashSet<String>,
}

impl DeviceDirectory {
    /// Creates an empty directory using the filters in `config`.
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            device_type: config.device_type.clone(),
            supported_major: config.supported_major_version,
            connected: HashSet::new(),
        }
    }

    /// Decide whether to open a channel for a discovered resource. Accepted
    /// devices are recorded as connected.
    pub fn admit(&mut self, host: IpAddr, resource: &ResourceDescriptor) -> Admission {
        if resource.dev_type != self.device_type {
            return Admission::WrongType;
        }
        if self.connected.contains(&resource.dev_id) {
            debug!(dev_id = %resource.dev_id, "ignoring channel, already registered");
            return Admission::AlreadyConnected;
        }
        if resource.version.major != self.supported_major {
            warn!(
                version = %resource.version,
                host = %host,
                name = %resource.display_name,
                "ignoring unsupported device version"
            );
            return Admission::UnsupportedVersion(resource.version.clone());
        }
        debug!(host = %host, resource = %resource, "discovered new channel");
        self.connected.insert(resource.dev_id.clone());
        Admission::Accept
    }

    /// Release a device after its channel shut down or failed, so that
    /// rediscovery can connect again.
    pub fn forget(&mut self, dev_id: &str) -> bool {
        self.connected.remove(dev_id)
    }

    /// Whether `dev_id` has a channel.
    pub fn is_connected(&self, dev_id: &str) -> bool {
        self.connected.contains(dev_id)
    }

    /// Number of connected devices.
    pub fn len(&self) -> usize {
        self.connected.len()
    }

    /// Whether no device is connected.
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }
}
