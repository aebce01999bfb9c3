//! Process-wide directory of protocol instances.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::device::TransportKind;
use crate::protocol::DeviceProtocol;

/// Mapping from protocol name to exactly one protocol instance.
///
/// Re-registration under an existing name replaces the prior instance.
/// The registry lives for the process lifetime; [`DeviceRegistry::reset`]
/// exists for test isolation and is never called in normal application
/// flow.
#[derive(Default)]
pub struct DeviceRegistry {
    protocols: DashMap<String, Arc<dyn DeviceProtocol>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            protocols: DashMap::new(),
        }
    }

    /// Insert, or replace in place when the name is already registered.
    pub fn register(&self, protocol: Arc<dyn DeviceProtocol>) {
        let name = protocol.name().to_string();
        debug!(protocol = %name, "registering device protocol");
        self.protocols.insert(name, protocol);
    }

    /// Exact-name lookup. Returns `None` for an empty or unknown name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn DeviceProtocol>> {
        if name.is_empty() {
            return None;
        }
        self.protocols.get(name).map(|entry| entry.value().clone())
    }

    /// Every registered protocol whose interface set contains `kind`.
    /// Empty when none match, never an absent result.
    pub fn find_by_interface(&self, kind: TransportKind) -> Vec<Arc<dyn DeviceProtocol>> {
        self.protocols
            .iter()
            .filter(|entry| entry.value().interfaces().contains(&kind))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of registered protocols.
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    /// Clear the registry entirely. Reserved for test isolation.
    pub fn reset(&self) {
        self.protocols.clear();
    }
}
