//! Device error display and conversion tests.

use velolink_devices::adapter::SessionState;
use velolink_devices::dircon::MessageError;
use velolink_devices::{DeviceError, TransportKind};

#[test]
fn test_error_display_not_implemented() {
    let error = DeviceError::NotImplemented("send_update");
    assert_eq!(format!("{}", error), "Not implemented: send_update");
}

#[test]
fn test_error_display_invalid_transition() {
    let error = DeviceError::InvalidTransition {
        operation: "pause",
        state: SessionState::Unconnected,
    };
    let message = format!("{}", error);
    assert!(message.contains("pause"));
    assert!(message.contains("unconnected"));
}

#[test]
fn test_error_display_missing_binding() {
    let error = DeviceError::MissingBinding(TransportKind::Serial);
    assert_eq!(format!("{}", error), "No serial binding configured");
}

#[test]
fn test_error_display_timeout() {
    let error = DeviceError::Timeout(5000);
    assert!(format!("{}", error).contains("5000ms"));
}

#[test]
fn test_message_error_converts_transparently() {
    let error = DeviceError::from(MessageError::UnknownType(0x42));
    assert_eq!(format!("{}", error), "Unknown message type: 66");
}

#[test]
fn test_error_from_anyhow() {
    let inner = anyhow::anyhow!("vendor driver misbehaved");
    let error = DeviceError::Other(inner);
    assert!(format!("{:?}", error).contains("vendor driver misbehaved"));
}
