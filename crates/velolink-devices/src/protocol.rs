//! Device protocol contract: scanning, discovery, device directory.
//!
//! A protocol is a transport/vendor family capable of scanning for and
//! producing adapters. Shared scan state -- the truthful scanning flag,
//! the stop request and the ordered discovered-device directory -- lives
//! in [`ProtocolState`], which concrete families embed and expose through
//! [`DeviceProtocol::state`]. Transport bindings are read lazily at
//! scan/connect time from the runtime context, never at construction, so
//! injection ordering does not matter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::device::{Capability, DeviceIdentity, DeviceResult, TransportKind};

/// Callback invoked for every device sighting during a scan.
pub type DeviceFoundHandler = Arc<dyn Fn(&DiscoveredDevice) + Send + Sync>;

/// Callback invoked once when a scan settles.
pub type ScanFinishedHandler = Arc<dyn Fn(&[DiscoveredDevice]) + Send + Sync>;

fn default_scan_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Options controlling one scan pass.
#[derive(Clone)]
pub struct ScanOptions {
    /// Overall scan timeout
    pub timeout: Duration,
    /// Invoked per device sighting
    pub on_device: Option<DeviceFoundHandler>,
    /// Invoked when the scan settles, with the devices known so far
    pub on_finished: Option<ScanFinishedHandler>,
}

impl ScanOptions {
    /// Options with the given timeout and no callbacks.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            on_device: None,
            on_finished: None,
        }
    }

    /// Set the per-device callback.
    pub fn with_on_device(mut self, handler: DeviceFoundHandler) -> Self {
        self.on_device = Some(handler);
        self
    }

    /// Set the scan-finished callback.
    pub fn with_on_finished(mut self, handler: ScanFinishedHandler) -> Self {
        self.on_finished = Some(handler);
        self
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new(default_scan_timeout())
    }
}

impl std::fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOptions")
            .field("timeout", &self.timeout)
            .field("on_device", &self.on_device.is_some())
            .field("on_finished", &self.on_finished.is_some())
            .finish()
    }
}

/// One sighting of a physical device during scanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Device identity as reported by the protocol
    pub identity: DeviceIdentity,
    /// Owning protocol family name
    pub protocol: String,
    /// Transport the sighting came over
    pub transport: TransportKind,
    /// Capabilities observed so far; may be a subset of the protocol's
    pub capabilities: Vec<Capability>,
    /// Last sighting timestamp (unix seconds)
    pub last_seen: i64,
}

impl DiscoveredDevice {
    /// Record a fresh sighting.
    pub fn new(
        identity: DeviceIdentity,
        protocol: impl Into<String>,
        transport: TransportKind,
    ) -> Self {
        Self {
            identity,
            protocol: protocol.into(),
            transport,
            capabilities: Vec::new(),
            last_seen: chrono::Utc::now().timestamp(),
        }
    }

    /// Add an observed capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }
}

/// Shared per-protocol scan state and discovered-device directory.
pub struct ProtocolState {
    scanning: AtomicBool,
    stop_requested: AtomicBool,
    devices: RwLock<Vec<DiscoveredDevice>>,
}

impl ProtocolState {
    pub fn new() -> Self {
        Self {
            scanning: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Whether a scan is currently in flight.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Mark a scan as started. Returns `false` when one is already in
    /// flight.
    pub fn begin_scan(&self) -> bool {
        !self.scanning.swap(true, Ordering::SeqCst)
    }

    /// Mark the scan as settled and clear any pending stop request.
    pub fn end_scan(&self) {
        self.scanning.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Request early termination of a running scan. No-op when idle.
    pub fn request_stop(&self) {
        if self.is_scanning() {
            self.stop_requested.store(true, Ordering::SeqCst);
        }
    }

    /// Whether early termination was requested for the current scan.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Append a new sighting, or refresh a known one in place. The first
    /// identity occupying a slot wins ties. Returns `true` for a fresh
    /// sighting.
    pub fn upsert_device(&self, device: DiscoveredDevice) -> bool {
        let mut devices = self.devices.write();
        match devices
            .iter_mut()
            .find(|known| known.identity.id == device.identity.id)
        {
            Some(known) => {
                known.capabilities = device.capabilities;
                known.last_seen = device.last_seen;
                false
            }
            None => {
                devices.push(device);
                true
            }
        }
    }

    /// Devices known so far, in first-sighting order.
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.devices.read().clone()
    }
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::new()
    }
}

/// A transport/vendor family capable of scanning for and producing
/// adapters.
#[async_trait]
pub trait DeviceProtocol: Send + Sync {
    /// Shared scan state embedded by the concrete family.
    fn state(&self) -> &ProtocolState;

    /// Unique family identifier.
    fn name(&self) -> &str;

    /// Transport kinds this protocol can run over.
    fn interfaces(&self) -> &[TransportKind];

    /// Protocol-level capability superset; an individual discovered
    /// device may realize a subset.
    fn capabilities(&self) -> &[Capability];

    fn is_bike(&self) -> bool {
        self.capabilities().contains(&Capability::Bike)
    }

    fn is_power(&self) -> bool {
        self.capabilities().contains(&Capability::Power)
    }

    fn is_hrm(&self) -> bool {
        self.capabilities().contains(&Capability::Hrm)
    }

    /// Begin asynchronous discovery; resolves with the devices known when
    /// the scan settles.
    async fn scan(&self, options: ScanOptions) -> DeviceResult<Vec<DiscoveredDevice>>;

    /// Whether a scan is currently in flight.
    fn is_scanning(&self) -> bool {
        self.state().is_scanning()
    }

    /// Request early termination of a running scan. No-op when idle.
    fn stop_scan(&self) {
        self.state().request_stop();
    }

    /// Devices known so far, in first-sighting order.
    fn devices(&self) -> Vec<DiscoveredDevice> {
        self.state().devices()
    }
}
