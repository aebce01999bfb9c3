//! Transport bindings and the runtime context.
//!
//! ANT, serial and network transports are injected once per process and
//! shared by every protocol instance. The binding slots are a
//! dependency-injection seam, not per-protocol configuration: tests
//! substitute mock transports, applications install the real ones at
//! startup. Concrete protocols read bindings lazily at scan/connect
//! time, never at construction, so injection ordering does not matter.
//!
//! [`RuntimeContext`] carries the binding slots together with the
//! protocol registry. One process-default instance is assembled on first
//! use ([`RuntimeContext::global`]); tests build private contexts to
//! keep substitution isolated.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::device::{DeviceError, DeviceResult, TransportKind};
use crate::registry::DeviceRegistry;

/// Byte-stream transport handle.
///
/// A stream is exclusively owned by one protocol/adapter pairing and is
/// never multiplexed.
#[async_trait]
pub trait TransportStream: Send {
    /// Write one outbound frame.
    async fn write(&mut self, data: &[u8]) -> DeviceResult<()>;

    /// Read the next inbound chunk. `Ok(None)` when the peer closed.
    async fn read(&mut self) -> DeviceResult<Option<Vec<u8>>>;

    /// Close the stream.
    async fn close(&mut self) -> DeviceResult<()>;
}

/// ANT stick binding.
#[async_trait]
pub trait AntBinding: Send + Sync {
    /// Open the ANT stick as a byte stream.
    async fn open(&self) -> DeviceResult<Box<dyn TransportStream>>;
}

/// Serial-port binding.
#[async_trait]
pub trait SerialBinding: Send + Sync {
    /// Open a serial port at the given path and baud rate.
    async fn open(&self, path: &str, baud_rate: u32) -> DeviceResult<Box<dyn TransportStream>>;
}

/// TCP network binding, used for raw TCP/IP and Direct Connect peers.
#[async_trait]
pub trait NetBinding: Send + Sync {
    /// Connect to a TCP peer.
    async fn connect(&self, host: &str, port: u16) -> DeviceResult<Box<dyn TransportStream>>;
}

/// Process-wide transport binding slots, written rarely and read often.
#[derive(Default)]
pub struct TransportBindings {
    ant: RwLock<Option<Arc<dyn AntBinding>>>,
    serial: RwLock<Option<Arc<dyn SerialBinding>>>,
    net: RwLock<Option<Arc<dyn NetBinding>>>,
}

impl TransportBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ant(&self, binding: Arc<dyn AntBinding>) {
        *self.ant.write() = Some(binding);
    }

    pub fn ant(&self) -> Option<Arc<dyn AntBinding>> {
        self.ant.read().clone()
    }

    /// Like [`TransportBindings::ant`], but a missing binding is an error.
    pub fn require_ant(&self) -> DeviceResult<Arc<dyn AntBinding>> {
        self.ant()
            .ok_or(DeviceError::MissingBinding(TransportKind::Ant))
    }

    pub fn set_serial(&self, binding: Arc<dyn SerialBinding>) {
        *self.serial.write() = Some(binding);
    }

    pub fn serial(&self) -> Option<Arc<dyn SerialBinding>> {
        self.serial.read().clone()
    }

    pub fn require_serial(&self) -> DeviceResult<Arc<dyn SerialBinding>> {
        self.serial()
            .ok_or(DeviceError::MissingBinding(TransportKind::Serial))
    }

    pub fn set_net(&self, binding: Arc<dyn NetBinding>) {
        *self.net.write() = Some(binding);
    }

    pub fn net(&self) -> Option<Arc<dyn NetBinding>> {
        self.net.read().clone()
    }

    pub fn require_net(&self) -> DeviceResult<Arc<dyn NetBinding>> {
        self.net()
            .ok_or(DeviceError::MissingBinding(TransportKind::Tcp))
    }
}

static GLOBAL: Lazy<Arc<RuntimeContext>> = Lazy::new(|| Arc::new(RuntimeContext::new()));

/// Runtime context carrying the binding slots and the protocol registry.
#[derive(Default)]
pub struct RuntimeContext {
    bindings: TransportBindings,
    registry: DeviceRegistry,
}

impl RuntimeContext {
    /// A fresh, empty context. Tests use this for isolation.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-default context.
    pub fn global() -> Arc<RuntimeContext> {
        GLOBAL.clone()
    }

    pub fn bindings(&self) -> &TransportBindings {
        &self.bindings
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }
}
