//! Device adapter contract and shared session state.
//!
//! Every device family (ANT+ sensors, BLE trainers, Direct Connect
//! trainers, ...) exposes the same capability and session-lifecycle
//! surface through [`DeviceAdapter`]. Shared partial behavior --
//! detection and selection flags, ignore flags, the cycling-mode
//! assignment, the single data observer and the session state machine --
//! lives in [`AdapterState`], which concrete adapters embed and expose
//! through [`DeviceAdapter::state`]. Missing transport behavior is a
//! compile-time error, not a runtime throw: the lifecycle methods are
//! required trait methods.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::device::{
    Capability, CyclingMode, DeviceData, DeviceError, DeviceIdentity, DeviceResult,
};
use crate::protocol::DeviceProtocol;

/// Session lifecycle state of an adapter.
///
/// Transitions: UNCONNECTED -> connect -> CONNECTED -> start -> RUNNING
/// -> pause -> PAUSED -> resume -> RUNNING -> stop -> UNCONNECTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport session
    Unconnected,
    /// Transport opened, no ride session yet
    Connected,
    /// Ride session active
    Running,
    /// Ride session paused
    Paused,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Handler invoked synchronously for every inbound sample.
pub type DataHandler = Box<dyn Fn(&DeviceData) + Send + Sync>;

/// Options for opening a ride session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartProps {
    /// Per-call timeout for opening the transport, milliseconds
    pub timeout_ms: Option<u64>,
    /// Attempt budget for opening the transport
    pub max_retries: Option<u32>,
    /// Free-form vendor options, passed through to the device family
    pub options: serde_json::Value,
}

impl StartProps {
    /// Set the transport-open timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the transport-open attempt budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Incremental ride-control delta sent to a controllable trainer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlRequest {
    /// Target slope, percent
    pub slope: Option<f64>,
    /// Target power, watts
    pub target_power: Option<f64>,
    /// Lower device power limit, watts
    pub min_power: Option<f64>,
    /// Upper device power limit, watts
    pub max_power: Option<f64>,
}

impl ControlRequest {
    /// Delta targeting a slope, percent.
    pub fn slope(slope: f64) -> Self {
        Self {
            slope: Some(slope),
            ..Self::default()
        }
    }

    /// Delta targeting a power, watts.
    pub fn target_power(watts: f64) -> Self {
        Self {
            target_power: Some(watts),
            ..Self::default()
        }
    }
}

/// Shared per-adapter state every device family embeds.
///
/// Keeps the contract's common behavior in one place so concrete adapters
/// only implement the transport-facing calls.
pub struct AdapterState {
    detected: AtomicBool,
    selected: AtomicBool,
    ignore_hrm: AtomicBool,
    ignore_power: AtomicBool,
    ignore_bike: AtomicBool,
    mode: RwLock<Option<CyclingMode>>,
    session: RwLock<SessionState>,
    handler: RwLock<Option<DataHandler>>,
}

impl AdapterState {
    /// Fresh state: undetected, unselected, nothing ignored, unconnected.
    pub fn new() -> Self {
        Self {
            detected: AtomicBool::new(false),
            selected: AtomicBool::new(false),
            ignore_hrm: AtomicBool::new(false),
            ignore_power: AtomicBool::new(false),
            ignore_bike: AtomicBool::new(false),
            mode: RwLock::new(None),
            session: RwLock::new(SessionState::Unconnected),
            handler: RwLock::new(None),
        }
    }

    /// Mark that the owning protocol located the physical device.
    pub fn set_detected(&self, flag: bool) {
        self.detected.store(flag, Ordering::SeqCst);
    }

    pub fn is_detected(&self) -> bool {
        self.detected.load(Ordering::SeqCst)
    }

    /// Record the application's intent to use this device. Selecting an
    /// undetected device is permitted; enforcement is the caller's call.
    pub fn select(&self) {
        self.selected.store(true, Ordering::SeqCst);
    }

    pub fn unselect(&self) {
        self.selected.store(false, Ordering::SeqCst);
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::SeqCst)
    }

    /// Suppress or restore one data channel. The reported capability
    /// flags are unaffected.
    pub fn set_ignore(&self, capability: Capability, flag: bool) {
        match capability {
            Capability::Hrm => self.ignore_hrm.store(flag, Ordering::SeqCst),
            Capability::Power => self.ignore_power.store(flag, Ordering::SeqCst),
            Capability::Bike => self.ignore_bike.store(flag, Ordering::SeqCst),
        }
    }

    pub fn is_ignored(&self, capability: Capability) -> bool {
        match capability {
            Capability::Hrm => self.ignore_hrm.load(Ordering::SeqCst),
            Capability::Power => self.ignore_power.load(Ordering::SeqCst),
            Capability::Bike => self.ignore_bike.load(Ordering::SeqCst),
        }
    }

    /// Attach a named riding mode and its option set.
    pub fn set_cycling_mode(&self, mode: CyclingMode) {
        *self.mode.write() = Some(mode);
    }

    pub fn cycling_mode(&self) -> Option<CyclingMode> {
        self.mode.read().clone()
    }

    /// Install the single data observer; a later call replaces it.
    pub fn set_data_handler(&self, handler: DataHandler) {
        *self.handler.write() = Some(handler);
    }

    /// Deliver one sample to the observer, synchronously, in arrival
    /// order. Samples on an ignored channel are dropped.
    pub fn emit(&self, data: &DeviceData) {
        if let Some(channel) = data.channel {
            if self.is_ignored(channel) {
                return;
            }
        }
        if let Some(handler) = self.handler.read().as_ref() {
            handler(data);
        }
    }

    /// Current session lifecycle state.
    pub fn session_state(&self) -> SessionState {
        *self.session.read()
    }

    /// Force the session state. Adapters call this after the transport
    /// work for a transition has succeeded.
    pub fn set_session_state(&self, state: SessionState) {
        *self.session.write() = state;
    }

    /// Fail with an invalid-transition error unless the current state is
    /// one of `allowed`.
    pub fn ensure(&self, operation: &'static str, allowed: &[SessionState]) -> DeviceResult<()> {
        let state = self.session_state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(DeviceError::InvalidTransition { operation, state })
        }
    }

    /// Check the transition is permitted, then apply it.
    pub fn transition(
        &self,
        operation: &'static str,
        from: &[SessionState],
        to: SessionState,
    ) -> DeviceResult<()> {
        let mut session = self.session.write();
        if !from.contains(&session) {
            return Err(DeviceError::InvalidTransition {
                operation,
                state: *session,
            });
        }
        *session = to;
        Ok(())
    }
}

impl Default for AdapterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform per-device handle: capability queries, session lifecycle, data
/// observer. One implementation per device family, independent of
/// transport.
///
/// Callers serialize lifecycle calls on one adapter (connect before
/// start, stop before a subsequent start); concurrent lifecycle calls on
/// the same adapter are undefined.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Shared adapter state embedded by the concrete device family.
    fn state(&self) -> &AdapterState;

    /// Identity of the underlying physical device.
    fn identity(&self) -> &DeviceIdentity;

    /// Name of the protocol family that produced this adapter.
    fn protocol_name(&self) -> &str;

    /// The owning protocol instance, when the adapter was produced by
    /// one. The back-reference is non-owning and lapses when the
    /// protocol is dropped.
    fn protocol(&self) -> Option<Arc<dyn DeviceProtocol>> {
        None
    }

    /// Data channels this device class provides.
    fn capabilities(&self) -> &[Capability];

    fn id(&self) -> &str {
        &self.identity().id
    }

    fn name(&self) -> &str {
        &self.identity().name
    }

    /// Defaults to the device name.
    fn display_name(&self) -> String {
        self.name().to_string()
    }

    fn port(&self) -> Option<&str> {
        self.identity().port.as_deref()
    }

    fn is_bike(&self) -> bool {
        self.capabilities().contains(&Capability::Bike)
    }

    fn is_power(&self) -> bool {
        self.capabilities().contains(&Capability::Power)
    }

    fn is_hrm(&self) -> bool {
        self.capabilities().contains(&Capability::Hrm)
    }

    fn set_detected(&self, flag: bool) {
        self.state().set_detected(flag);
    }

    fn is_detected(&self) -> bool {
        self.state().is_detected()
    }

    fn select(&self) {
        self.state().select();
    }

    fn unselect(&self) {
        self.state().unselect();
    }

    fn is_selected(&self) -> bool {
        self.state().is_selected()
    }

    fn set_cycling_mode(&self, mode: CyclingMode) {
        self.state().set_cycling_mode(mode);
    }

    fn cycling_mode(&self) -> Option<CyclingMode> {
        self.state().cycling_mode()
    }

    fn set_ignore_hrm(&self, flag: bool) {
        self.state().set_ignore(Capability::Hrm, flag);
    }

    fn set_ignore_power(&self, flag: bool) {
        self.state().set_ignore(Capability::Power, flag);
    }

    fn set_ignore_bike(&self, flag: bool) {
        self.state().set_ignore(Capability::Bike, flag);
    }

    fn is_ignored(&self, capability: Capability) -> bool {
        self.state().is_ignored(capability)
    }

    /// Install the single data observer; a later call replaces it.
    fn on_data(&self, handler: DataHandler) {
        self.state().set_data_handler(handler);
    }

    /// Current session lifecycle state.
    fn session_state(&self) -> SessionState {
        self.state().session_state()
    }

    /// Open the transport session.
    async fn connect(&self) -> DeviceResult<()>;

    /// Begin a ride session. Fails when the transport cannot be opened.
    async fn start(&self, props: StartProps) -> DeviceResult<()>;

    /// Pause a running ride session. Only permitted from RUNNING.
    async fn pause(&self) -> DeviceResult<()>;

    /// Resume a paused ride session. Only permitted from PAUSED.
    async fn resume(&self) -> DeviceResult<()>;

    /// Send an incremental ride-control delta. Only permitted from
    /// RUNNING or PAUSED.
    async fn send_update(&self, request: ControlRequest) -> DeviceResult<()>;

    /// Tear down the session. Repeat calls are not errors.
    async fn stop(&self) -> DeviceResult<()>;

    /// Periodic housekeeping invoked by the owning protocol outside the
    /// lifecycle transitions. Must not alter detection or selection
    /// state.
    async fn check(&self) -> DeviceResult<()> {
        Ok(())
    }

    /// Periodic refresh hook; same restrictions as [`DeviceAdapter::check`].
    async fn update(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    struct FanAdapter {
        identity: DeviceIdentity,
        state: AdapterState,
    }

    impl FanAdapter {
        fn new() -> Self {
            Self {
                identity: DeviceIdentity::new("fan-1", "Headwind"),
                state: AdapterState::new(),
            }
        }
    }

    #[async_trait]
    impl DeviceAdapter for FanAdapter {
        fn state(&self) -> &AdapterState {
            &self.state
        }

        fn identity(&self) -> &DeviceIdentity {
            &self.identity
        }

        fn protocol_name(&self) -> &str {
            "test"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::Bike, Capability::Power]
        }

        async fn connect(&self) -> DeviceResult<()> {
            self.state
                .transition("connect", &[SessionState::Unconnected], SessionState::Connected)
        }

        async fn start(&self, _props: StartProps) -> DeviceResult<()> {
            self.state
                .transition("start", &[SessionState::Connected], SessionState::Running)
        }

        async fn pause(&self) -> DeviceResult<()> {
            self.state
                .transition("pause", &[SessionState::Running], SessionState::Paused)
        }

        async fn resume(&self) -> DeviceResult<()> {
            self.state
                .transition("resume", &[SessionState::Paused], SessionState::Running)
        }

        async fn send_update(&self, _request: ControlRequest) -> DeviceResult<()> {
            self.state
                .ensure("send_update", &[SessionState::Running, SessionState::Paused])
        }

        async fn stop(&self) -> DeviceResult<()> {
            self.state.set_session_state(SessionState::Unconnected);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let adapter = FanAdapter::new();
        assert_eq!(adapter.session_state(), SessionState::Unconnected);

        adapter.connect().await.unwrap();
        assert_eq!(adapter.session_state(), SessionState::Connected);

        adapter.start(StartProps::default()).await.unwrap();
        assert_eq!(adapter.session_state(), SessionState::Running);

        adapter.pause().await.unwrap();
        assert_eq!(adapter.session_state(), SessionState::Paused);

        adapter.send_update(ControlRequest::slope(2.5)).await.unwrap();

        adapter.resume().await.unwrap();
        assert_eq!(adapter.session_state(), SessionState::Running);

        adapter.stop().await.unwrap();
        assert_eq!(adapter.session_state(), SessionState::Unconnected);
    }

    #[tokio::test]
    async fn test_pause_before_start_fails() {
        let adapter = FanAdapter::new();
        let err = adapter.pause().await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InvalidTransition {
                operation: "pause",
                state: SessionState::Unconnected
            }
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let adapter = FanAdapter::new();
        adapter.stop().await.unwrap();
        adapter.stop().await.unwrap();
        assert_eq!(adapter.session_state(), SessionState::Unconnected);
    }

    #[tokio::test]
    async fn test_send_update_requires_session() {
        let adapter = FanAdapter::new();
        adapter.connect().await.unwrap();
        let err = adapter
            .send_update(ControlRequest::target_power(200.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidTransition { .. }));
    }

    #[test]
    fn test_capability_queries() {
        let adapter = FanAdapter::new();
        assert!(adapter.is_bike());
        assert!(adapter.is_power());
        assert!(!adapter.is_hrm());
        assert_eq!(adapter.display_name(), "Headwind");
    }

    #[test]
    fn test_detection_and_selection_flags() {
        let adapter = FanAdapter::new();
        assert!(!adapter.is_detected());
        assert!(!adapter.is_selected());

        adapter.set_detected(true);
        adapter.select();
        assert!(adapter.is_detected());
        assert!(adapter.is_selected());

        adapter.unselect();
        assert!(!adapter.is_selected());
        assert!(adapter.is_detected());
    }

    #[test]
    fn test_observer_replacement() {
        let state = AdapterState::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let counter = first.clone();
        state.set_data_handler(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        state.emit(&DeviceData::new("fan-1"));

        let counter = second.clone();
        state.set_data_handler(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        state.emit(&DeviceData::new("fan-1"));
        state.emit(&DeviceData::new("fan-1"));

        // later registration replaces, never stacks
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ignore_flags_filter_emit() {
        let state = AdapterState::new();
        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();
        state.set_data_handler(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        state.set_ignore(Capability::Hrm, true);
        state.emit(&DeviceData::new("trainer").with_channel(Capability::Hrm));
        state.emit(&DeviceData::new("trainer").with_channel(Capability::Power));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        state.set_ignore(Capability::Hrm, false);
        state.emit(&DeviceData::new("trainer").with_channel(Capability::Hrm));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
