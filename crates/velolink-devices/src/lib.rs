//! Device communication framework for indoor-cycling hardware.
//!
//! This crate gives a calling application one capability-oriented adapter
//! contract for trainers, power meters and heart-rate sensors reachable
//! over heterogeneous transports: ANT+, Bluetooth Low Energy, serial,
//! raw TCP/IP and the binary Direct Connect protocol.
//!
//! ## Architecture
//!
//! - **DeviceAdapter**: uniform per-device handle (capability queries,
//!   session lifecycle, data observer)
//! - **DeviceProtocol**: a transport/vendor family capable of scanning
//!   for and producing adapters
//! - **DeviceRegistry**: process-wide directory of protocol instances
//! - **RuntimeContext**: transport-binding slots plus the registry, the
//!   dependency-injection seam for mock transports
//! - **dircon**: the Direct Connect message codec, channel and protocol
//!
//! An application selects a transport by name, obtains a protocol from
//! the registry, scans for devices and drives the resulting adapters:
//! connect, start, send_update, pause/resume, stop. Vendor sensor
//! drivers implement the adapter contract; this crate carries their
//! shared behavior.

pub mod adapter;
pub mod context;
pub mod device;
pub mod dircon;
pub mod protocol;
pub mod registry;

pub use adapter::{
    AdapterState, ControlRequest, DataHandler, DeviceAdapter, SessionState, StartProps,
};
pub use context::{
    AntBinding, NetBinding, RuntimeContext, SerialBinding, TransportBindings, TransportStream,
};
pub use device::{
    Capability, CyclingMode, DeviceData, DeviceError, DeviceIdentity, DeviceResult, TransportKind,
};
pub use protocol::{
    DeviceFoundHandler, DeviceProtocol, DiscoveredDevice, ProtocolState, ScanFinishedHandler,
    ScanOptions,
};
pub use registry::DeviceRegistry;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
