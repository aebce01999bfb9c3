//! Direct Connect binary protocol.
//!
//! Direct Connect tunnels Bluetooth GATT-style operations -- discover
//! services and characteristics, read/write a characteristic, enable and
//! receive notifications -- over a TCP byte stream, for trainers that
//! expose a WiFi-direct interface.
//!
//! - [`message`]: the fixed six-byte header and its validation
//! - [`messages`]: the closed set of message types, one independent
//!   encode/decode pair each
//! - [`factory`]: the type-id mapping, frame-level dispatch and error
//!   responses
//! - [`channel`]: request/response correlation over one socket
//! - [`protocol`]: the [`crate::protocol::DeviceProtocol`] and
//!   [`crate::adapter::DeviceAdapter`] implementations built on the above

pub mod channel;
pub mod factory;
pub mod message;
pub mod messages;
pub mod protocol;

pub use channel::{status, DirectConnectChannel, NotificationHandler};
pub use factory::{
    build_error_response, build_request, build_response, parse_request, parse_response,
    MessageType, Request, Response,
};
pub use message::{MessageError, MessageHeader, MessageResult, HEADER_LEN};
pub use messages::{
    CharacteristicAck, CharacteristicDefinition, CharacteristicList, CharacteristicNotification,
    CharacteristicQuery, CharacteristicValue, CharacteristicWrite, DiscoverCharacteristics,
    DiscoverServices, EnableCharacteristicNotifications, MessageCodec, NotificationToggle,
    ReadCharacteristic, ServiceList, ServiceQuery, WriteCharacteristic, UUID_LEN,
};
pub use protocol::{
    DirectConnectAdapter, DirectConnectPeer, DirectConnectProtocol, FITNESS_MACHINE_SERVICE,
    HEART_RATE_SERVICE, PROTOCOL_NAME,
};
