//! Direct Connect protocol and adapter implementations.
//!
//! Realizes the device contracts over the network binding. Scanning
//! probes an explicitly configured peer list (radio/mDNS discovery is
//! out of scope for this layer) with a DiscoverServices exchange and
//! classifies capabilities from the advertised services. Each adapter
//! drives one exclusively owned channel.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::{uuid, Uuid};

use velolink_core::run_with_retries;

use super::channel::DirectConnectChannel;
use super::factory::{Request, Response};
use super::messages::{CharacteristicWrite, NotificationToggle};
use crate::adapter::{
    AdapterState, ControlRequest, DeviceAdapter, SessionState, StartProps,
};
use crate::context::RuntimeContext;
use crate::device::{
    Capability, DeviceData, DeviceError, DeviceIdentity, DeviceResult, TransportKind,
};
use crate::protocol::{DeviceProtocol, DiscoveredDevice, ProtocolState, ScanOptions};

/// Name under which the Direct Connect protocol registers.
pub const PROTOCOL_NAME: &str = "direct-connect";

/// Fitness Machine service.
pub const FITNESS_MACHINE_SERVICE: Uuid = uuid!("00001826-0000-1000-8000-00805f9b34fb");
/// Cycling Power service.
pub const CYCLING_POWER_SERVICE: Uuid = uuid!("00001818-0000-1000-8000-00805f9b34fb");
/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = uuid!("0000180d-0000-1000-8000-00805f9b34fb");

/// Indoor Bike Data characteristic (ride data notifications).
pub const INDOOR_BIKE_DATA: Uuid = uuid!("00002ad2-0000-1000-8000-00805f9b34fb");
/// Fitness Machine Control Point characteristic (ride control writes).
pub const FITNESS_MACHINE_CONTROL_POINT: Uuid = uuid!("00002ad9-0000-1000-8000-00805f9b34fb");

const CONNECT_RETRIES: u32 = 3;
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// One configured Direct Connect peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectConnectPeer {
    /// Human-readable device name
    pub name: String,
    /// Peer host (address or hostname)
    pub host: String,
    /// Peer TCP port
    pub port: u16,
}

impl DirectConnectPeer {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// Stable device id for this peer.
    fn device_id(&self) -> String {
        format!("dc:{}:{}", self.host, self.port)
    }
}

fn capabilities_for(services: &[Uuid]) -> Vec<Capability> {
    let mut capabilities = Vec::new();
    if services.contains(&FITNESS_MACHINE_SERVICE) {
        capabilities.push(Capability::Bike);
        capabilities.push(Capability::Power);
    }
    if services.contains(&CYCLING_POWER_SERVICE) && !capabilities.contains(&Capability::Power) {
        capabilities.push(Capability::Power);
    }
    if services.contains(&HEART_RATE_SERVICE) {
        capabilities.push(Capability::Hrm);
    }
    capabilities
}

/// Direct Connect protocol family.
pub struct DirectConnectProtocol {
    context: Arc<RuntimeContext>,
    peers: RwLock<Vec<DirectConnectPeer>>,
    state: ProtocolState,
}

impl DirectConnectProtocol {
    /// Create a protocol instance reading its transport bindings from
    /// `context` lazily at scan/connect time.
    pub fn new(context: Arc<RuntimeContext>) -> Self {
        Self {
            context,
            peers: RwLock::new(Vec::new()),
            state: ProtocolState::new(),
        }
    }

    /// Add a peer to probe during scans.
    pub fn with_peer(self, peer: DirectConnectPeer) -> Self {
        self.add_peer(peer);
        self
    }

    /// Add a peer to probe during scans.
    pub fn add_peer(&self, peer: DirectConnectPeer) {
        self.peers.write().push(peer);
    }

    /// Build an adapter bound to a previously discovered device. The
    /// adapter keeps a non-owning back-reference to this protocol.
    pub fn create_adapter(self: &Arc<Self>, device_id: &str) -> DeviceResult<DirectConnectAdapter> {
        let device = self
            .state
            .devices()
            .into_iter()
            .find(|device| device.identity.id == device_id)
            .ok_or_else(|| {
                DeviceError::Configuration(format!("unknown device: {device_id}"))
            })?;
        let peer = self
            .peers
            .read()
            .iter()
            .find(|peer| peer.device_id() == device_id)
            .cloned()
            .ok_or_else(|| {
                DeviceError::Configuration(format!("no peer configured for: {device_id}"))
            })?;
        let mut adapter =
            DirectConnectAdapter::new(peer, device.capabilities, self.context.clone());
        adapter.protocol = Arc::downgrade(self);
        Ok(adapter)
    }

    async fn probe(&self, peer: &DirectConnectPeer) -> DeviceResult<DiscoveredDevice> {
        let net = self.context.bindings().require_net()?;
        let stream = net.connect(&peer.host, peer.port).await?;
        let mut channel = DirectConnectChannel::new(stream);

        let response = channel.request(&Request::DiscoverServices).await?;
        let _ = channel.close().await;

        let Response::DiscoverServices(list) = response else {
            return Err(DeviceError::Communication(
                "unexpected response to discover services".to_string(),
            ));
        };

        let identity = DeviceIdentity::new(peer.device_id(), &peer.name)
            .with_port(peer.port.to_string());
        let mut device =
            DiscoveredDevice::new(identity, PROTOCOL_NAME, TransportKind::DirectConnect);
        device.capabilities = capabilities_for(&list.services);
        Ok(device)
    }
}

#[async_trait]
impl DeviceProtocol for DirectConnectProtocol {
    fn state(&self) -> &ProtocolState {
        &self.state
    }

    fn name(&self) -> &str {
        PROTOCOL_NAME
    }

    fn interfaces(&self) -> &[TransportKind] {
        &[TransportKind::Tcp, TransportKind::DirectConnect]
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Bike, Capability::Power, Capability::Hrm]
    }

    async fn scan(&self, options: ScanOptions) -> DeviceResult<Vec<DiscoveredDevice>> {
        if !self.state.begin_scan() {
            return Err(DeviceError::Configuration(
                "scan already in flight".to_string(),
            ));
        }
        info!(
            timeout_ms = options.timeout.as_millis() as u64,
            "direct connect scan started"
        );

        let deadline = tokio::time::Instant::now() + options.timeout;
        let peers = self.peers.read().clone();

        for peer in &peers {
            if self.state.stop_requested() {
                debug!("scan stop requested, ending early");
                break;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                warn!("scan timeout reached before probing every peer");
                break;
            }
            match tokio::time::timeout(remaining, self.probe(peer)).await {
                Ok(Ok(device)) => {
                    debug!(device = %device.identity.id, "peer answered discover services");
                    self.state.upsert_device(device.clone());
                    if let Some(on_device) = &options.on_device {
                        on_device(&device);
                    }
                }
                Ok(Err(DeviceError::MissingBinding(kind))) => {
                    self.state.end_scan();
                    return Err(DeviceError::MissingBinding(kind));
                }
                Ok(Err(err)) => {
                    warn!(peer = %peer.host, %err, "peer probe failed");
                }
                Err(_) => {
                    warn!(peer = %peer.host, "peer probe hit the scan timeout");
                    break;
                }
            }
        }

        let devices = self.state.devices();
        if let Some(on_finished) = &options.on_finished {
            on_finished(&devices);
        }
        self.state.end_scan();
        info!(count = devices.len(), "direct connect scan finished");
        Ok(devices)
    }
}

/// Per-device Direct Connect adapter driving one channel.
///
/// Ride-control deltas are serialized as JSON by default; vendor drivers
/// that own a bit-level control-point encoding wrap or replace this
/// adapter.
pub struct DirectConnectAdapter {
    identity: DeviceIdentity,
    peer: DirectConnectPeer,
    capabilities: Vec<Capability>,
    context: Arc<RuntimeContext>,
    protocol: Weak<DirectConnectProtocol>,
    state: Arc<AdapterState>,
    channel: Mutex<Option<DirectConnectChannel>>,
    data_characteristic: Uuid,
    control_characteristic: Uuid,
}

impl DirectConnectAdapter {
    /// Create an adapter for a configured peer.
    pub fn new(
        peer: DirectConnectPeer,
        capabilities: Vec<Capability>,
        context: Arc<RuntimeContext>,
    ) -> Self {
        let identity = DeviceIdentity::new(peer.device_id(), &peer.name)
            .with_port(peer.port.to_string());
        Self {
            identity,
            peer,
            capabilities,
            context,
            protocol: Weak::new(),
            state: Arc::new(AdapterState::new()),
            channel: Mutex::new(None),
            data_characteristic: INDOOR_BIKE_DATA,
            control_characteristic: FITNESS_MACHINE_CONTROL_POINT,
        }
    }

    /// Override the characteristic carrying ride-data notifications.
    pub fn with_data_characteristic(mut self, uuid: Uuid) -> Self {
        self.data_characteristic = uuid;
        self
    }

    /// Override the characteristic accepting ride-control writes.
    pub fn with_control_characteristic(mut self, uuid: Uuid) -> Self {
        self.control_characteristic = uuid;
        self
    }
}

#[async_trait]
impl DeviceAdapter for DirectConnectAdapter {
    fn state(&self) -> &AdapterState {
        &self.state
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn protocol_name(&self) -> &str {
        PROTOCOL_NAME
    }

    fn protocol(&self) -> Option<Arc<dyn DeviceProtocol>> {
        self.protocol
            .upgrade()
            .map(|protocol| protocol as Arc<dyn DeviceProtocol>)
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn connect(&self) -> DeviceResult<()> {
        self.state.ensure("connect", &[SessionState::Unconnected])?;

        // Binding is read lazily, here, not at construction. Opening the
        // link goes through the bounded retry budget.
        let net = self.context.bindings().require_net()?;
        let stream = run_with_retries(
            || {
                let net = net.clone();
                let host = self.peer.host.clone();
                let port = self.peer.port;
                async move { net.connect(&host, port).await }
            },
            CONNECT_RETRIES,
            CONNECT_RETRY_INTERVAL,
        )
        .await?;

        let mut channel = DirectConnectChannel::new(stream);
        let state = self.state.clone();
        let device_id = self.identity.id.clone();
        let data_characteristic = self.data_characteristic;
        channel.on_notification(Box::new(move |value| {
            let channel_tag = (value.characteristic_uuid == data_characteristic)
                .then_some(Capability::Bike);
            let mut data = DeviceData::new(&device_id).with_value("payload", value.data.clone());
            data.channel = channel_tag;
            state.emit(&data);
        }));

        *self.channel.lock().await = Some(channel);
        self.state.set_session_state(SessionState::Connected);
        info!(device = %self.identity.id, "direct connect session opened");
        Ok(())
    }

    async fn start(&self, props: StartProps) -> DeviceResult<()> {
        self.state.ensure("start", &[SessionState::Connected])?;

        let mut guard = self.channel.lock().await;
        let channel = guard
            .as_mut()
            .ok_or_else(|| DeviceError::Connection("transport not open".to_string()))?;

        let toggle = NotificationToggle {
            characteristic_uuid: self.data_characteristic,
            enable: true,
        };
        let request = Request::EnableCharacteristicNotifications(toggle);
        let exchange = channel.request(&request);
        match props.timeout_ms {
            Some(timeout_ms) => {
                tokio::time::timeout(Duration::from_millis(timeout_ms), exchange)
                    .await
                    .map_err(|_| DeviceError::Timeout(timeout_ms))??;
            }
            None => {
                exchange.await?;
            }
        }

        self.state.set_session_state(SessionState::Running);
        info!(device = %self.identity.id, "ride session started");
        Ok(())
    }

    async fn pause(&self) -> DeviceResult<()> {
        self.state
            .transition("pause", &[SessionState::Running], SessionState::Paused)
    }

    async fn resume(&self) -> DeviceResult<()> {
        self.state
            .transition("resume", &[SessionState::Paused], SessionState::Running)
    }

    async fn send_update(&self, request: ControlRequest) -> DeviceResult<()> {
        self.state
            .ensure("send_update", &[SessionState::Running, SessionState::Paused])?;

        let payload = serde_json::to_vec(&request)
            .map_err(|err| DeviceError::Configuration(err.to_string()))?;

        let mut guard = self.channel.lock().await;
        let channel = guard
            .as_mut()
            .ok_or_else(|| DeviceError::Connection("transport not open".to_string()))?;

        let write = CharacteristicWrite {
            characteristic_uuid: self.control_characteristic,
            data: payload,
        };
        channel.request(&Request::WriteCharacteristic(write)).await?;
        debug!(device = %self.identity.id, ?request, "ride control update sent");
        Ok(())
    }

    async fn stop(&self) -> DeviceResult<()> {
        // Repeat calls are not errors.
        if self.state.session_state() == SessionState::Unconnected {
            return Ok(());
        }
        if let Some(mut channel) = self.channel.lock().await.take() {
            let _ = channel.close().await;
        }
        self.state.set_session_state(SessionState::Unconnected);
        info!(device = %self.identity.id, "direct connect session closed");
        Ok(())
    }

    async fn update(&self) {
        // Drain notifications buffered before the handler was installed.
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return;
        };
        while let Some(value) = channel.take_notification() {
            let channel_tag = (value.characteristic_uuid == self.data_characteristic)
                .then_some(Capability::Bike);
            let mut data =
                DeviceData::new(&self.identity.id).with_value("payload", value.data);
            data.channel = channel_tag;
            self.state.emit(&data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_from_services() {
        let caps = capabilities_for(&[FITNESS_MACHINE_SERVICE, HEART_RATE_SERVICE]);
        assert_eq!(
            caps,
            vec![Capability::Bike, Capability::Power, Capability::Hrm]
        );

        let caps = capabilities_for(&[CYCLING_POWER_SERVICE]);
        assert_eq!(caps, vec![Capability::Power]);

        assert!(capabilities_for(&[]).is_empty());
    }

    #[test]
    fn test_peer_device_id() {
        let peer = DirectConnectPeer::new("KICKR CORE", "192.168.1.40", 36866);
        assert_eq!(peer.device_id(), "dc:192.168.1.40:36866");
    }

    #[test]
    fn test_protocol_identity() {
        let protocol = DirectConnectProtocol::new(Arc::new(RuntimeContext::new()));
        assert_eq!(protocol.name(), PROTOCOL_NAME);
        assert!(protocol.is_bike());
        assert!(protocol.is_power());
        assert!(protocol.is_hrm());
        assert!(protocol
            .interfaces()
            .contains(&TransportKind::DirectConnect));
    }
}
