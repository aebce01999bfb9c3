//! Device identity and capability model.
//!
//! The unified vocabulary shared by every adapter and protocol family:
//! what a device is called, which transports it is reachable over, which
//! data channels it provides, and the errors its operations surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use velolink_core::{MetricValue, SettingValue};

/// Data channel a device class can provide.
///
/// Capabilities are not mutually exclusive: a smart trainer is both a
/// `Bike` and a `Power` source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Smart-trainer control and riding data
    Bike,
    /// Power measurement
    Power,
    /// Heart-rate measurement
    Hrm,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bike => write!(f, "bike"),
            Self::Power => write!(f, "power"),
            Self::Hrm => write!(f, "hrm"),
        }
    }
}

/// Transport family a protocol can run over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// ANT+ radio via a USB stick
    Ant,
    /// Bluetooth Low Energy
    Ble,
    /// Serial port
    Serial,
    /// Raw TCP/IP
    Tcp,
    /// Direct Connect: GATT-style operations tunneled over TCP
    DirectConnect,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ant => write!(f, "ant"),
            Self::Ble => write!(f, "ble"),
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
            Self::DirectConnect => write!(f, "direct-connect"),
        }
    }
}

/// Identity of a physical device as reported by its protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable identifier within the owning protocol (address, peer, path)
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Port the device is reachable on, when the transport has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl DeviceIdentity {
    /// Create a new device identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            port: None,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }
}

/// One decoded sample emitted by a device.
///
/// The core carries samples opaquely; bit-level profile decoding is owned
/// by the vendor drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    /// Device the sample came from
    pub device_id: String,
    /// Data channel the sample belongs to, when the adapter knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Capability>,
    /// Sampled values keyed by metric name
    pub values: HashMap<String, MetricValue>,
    /// Arrival timestamp (unix seconds)
    pub timestamp: i64,
}

impl DeviceData {
    /// Create an empty sample for a device.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            channel: None,
            values: HashMap::new(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Tag the sample with its data channel.
    pub fn with_channel(mut self, channel: Capability) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Add one named value.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

/// Named riding mode with its option set, carried opaquely.
///
/// Per-mode validation belongs to the vendor driver that defines the mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclingMode {
    /// Mode name (e.g. "erg", "slope-simulation")
    pub name: String,
    /// Mode options keyed by setting name
    #[serde(default)]
    pub settings: HashMap<String, SettingValue>,
}

impl CyclingMode {
    /// Create a mode with no settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: HashMap::new(),
        }
    }

    /// Add one setting.
    pub fn with_setting(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors surfaced by device operations.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Operation has no implementation for this device family
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// Lifecycle call made from a state that does not permit it
    #[error("Invalid transition: {operation} not permitted in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: crate::adapter::SessionState,
    },

    /// Transport could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// Established link failed mid-operation
    #[error("Communication error: {0}")]
    Communication(String),

    /// No transport binding injected for the required kind
    #[error("No {0} binding configured")]
    MissingBinding(TransportKind),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed Direct Connect message
    #[error(transparent)]
    Message(#[from] crate::dircon::MessageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Device error: {0}")]
    Other(#[from] anyhow::Error),
}
