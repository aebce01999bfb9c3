//! The closed set of Direct Connect message types.
//!
//! Each type is an independent encode/decode pair: an initiator builds
//! request bodies and parses response bodies, a responder parses request
//! bodies and builds response bodies. A given role only ever needs one
//! direction. Message types are stateless beyond their wire id and safe
//! to reuse.

use uuid::Uuid;

use super::message::{self, MessageError, MessageHeader, MessageResult};

/// Length of a 128-bit service or characteristic identifier on the wire.
pub const UUID_LEN: usize = 16;

/// Stride of one characteristic definition in a discover-characteristics
/// response: identifier plus property flags.
const CHARACTERISTIC_STRIDE: usize = UUID_LEN + 1;

/// Encode/decode pair for one Direct Connect message type.
pub trait MessageCodec {
    /// Message-type id carried in header byte 1.
    const MSG_ID: u8;

    /// Request body payload.
    type Request;

    /// Response body payload.
    type Response;

    fn build_request_body(request: &Self::Request) -> Vec<u8>;
    fn parse_request_body(body: &[u8]) -> MessageResult<Self::Request>;
    fn build_response_body(response: &Self::Response) -> Vec<u8>;
    fn parse_response_body(body: &[u8]) -> MessageResult<Self::Response>;

    /// Parse a full request frame for this known type. The header's
    /// type id is verified before any body parsing is attempted.
    fn parse_request_frame(buffer: &[u8]) -> MessageResult<(MessageHeader, Self::Request)> {
        let header = MessageHeader::parse(buffer)?;
        header.verify(Self::MSG_ID)?;
        Ok((header, Self::parse_request_body(message::body(buffer)?)?))
    }

    /// Parse a full response frame for this known type. The header's
    /// type id is verified before any body parsing is attempted.
    fn parse_response_frame(buffer: &[u8]) -> MessageResult<(MessageHeader, Self::Response)> {
        let header = MessageHeader::parse(buffer)?;
        header.verify(Self::MSG_ID)?;
        Ok((header, Self::parse_response_body(message::body(buffer)?)?))
    }
}

fn read_uuid(body: &[u8], offset: usize) -> MessageResult<Uuid> {
    let end = offset + UUID_LEN;
    if body.len() < end {
        return Err(MessageError::InvalidLength {
            expected: end,
            actual: body.len(),
        });
    }
    let mut bytes = [0u8; UUID_LEN];
    bytes.copy_from_slice(&body[offset..end]);
    Ok(Uuid::from_bytes(bytes))
}

fn expect_len(body: &[u8], expected: usize) -> MessageResult<()> {
    if body.len() != expected {
        return Err(MessageError::InvalidLength {
            expected,
            actual: body.len(),
        });
    }
    Ok(())
}

/// Discover the services a peer exposes.
pub struct DiscoverServices;

/// The discovered service identifiers, in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceList {
    pub services: Vec<Uuid>,
}

impl MessageCodec for DiscoverServices {
    const MSG_ID: u8 = 0x01;
    type Request = ();
    type Response = ServiceList;

    fn build_request_body(_request: &()) -> Vec<u8> {
        Vec::new()
    }

    fn parse_request_body(body: &[u8]) -> MessageResult<()> {
        expect_len(body, 0)
    }

    fn build_response_body(response: &ServiceList) -> Vec<u8> {
        let mut body = Vec::with_capacity(response.services.len() * UUID_LEN);
        for service in &response.services {
            body.extend_from_slice(service.as_bytes());
        }
        body
    }

    /// Walks the buffer in fixed 16-byte strides, one block per service.
    fn parse_response_body(body: &[u8]) -> MessageResult<ServiceList> {
        if body.len() % UUID_LEN != 0 {
            return Err(MessageError::InvalidLength {
                expected: (body.len() / UUID_LEN + 1) * UUID_LEN,
                actual: body.len(),
            });
        }
        let services = body
            .chunks_exact(UUID_LEN)
            .map(|chunk| {
                let mut bytes = [0u8; UUID_LEN];
                bytes.copy_from_slice(chunk);
                Uuid::from_bytes(bytes)
            })
            .collect();
        Ok(ServiceList { services })
    }
}

/// Discover the characteristics of one service.
pub struct DiscoverCharacteristics;

/// Which service to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceQuery {
    pub service_uuid: Uuid,
}

/// One discovered characteristic: identifier plus GATT property flags.
/// The flags are vendor-interpreted; this codec passes them through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicDefinition {
    pub uuid: Uuid,
    pub properties: u8,
}

/// The enumerated service and its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicList {
    pub service_uuid: Uuid,
    pub characteristics: Vec<CharacteristicDefinition>,
}

impl MessageCodec for DiscoverCharacteristics {
    const MSG_ID: u8 = 0x02;
    type Request = ServiceQuery;
    type Response = CharacteristicList;

    fn build_request_body(request: &ServiceQuery) -> Vec<u8> {
        request.service_uuid.as_bytes().to_vec()
    }

    fn parse_request_body(body: &[u8]) -> MessageResult<ServiceQuery> {
        expect_len(body, UUID_LEN)?;
        Ok(ServiceQuery {
            service_uuid: read_uuid(body, 0)?,
        })
    }

    fn build_response_body(response: &CharacteristicList) -> Vec<u8> {
        let mut body =
            Vec::with_capacity(UUID_LEN + response.characteristics.len() * CHARACTERISTIC_STRIDE);
        body.extend_from_slice(response.service_uuid.as_bytes());
        for characteristic in &response.characteristics {
            body.extend_from_slice(characteristic.uuid.as_bytes());
            body.push(characteristic.properties);
        }
        body
    }

    fn parse_response_body(body: &[u8]) -> MessageResult<CharacteristicList> {
        let service_uuid = read_uuid(body, 0)?;
        let rest = &body[UUID_LEN..];
        if rest.len() % CHARACTERISTIC_STRIDE != 0 {
            return Err(MessageError::InvalidLength {
                expected: UUID_LEN + (rest.len() / CHARACTERISTIC_STRIDE + 1) * CHARACTERISTIC_STRIDE,
                actual: body.len(),
            });
        }
        let characteristics = rest
            .chunks_exact(CHARACTERISTIC_STRIDE)
            .map(|chunk| {
                let mut bytes = [0u8; UUID_LEN];
                bytes.copy_from_slice(&chunk[..UUID_LEN]);
                CharacteristicDefinition {
                    uuid: Uuid::from_bytes(bytes),
                    properties: chunk[UUID_LEN],
                }
            })
            .collect();
        Ok(CharacteristicList {
            service_uuid,
            characteristics,
        })
    }
}

/// Read the current value of one characteristic.
pub struct ReadCharacteristic;

/// Which characteristic to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicQuery {
    pub characteristic_uuid: Uuid,
}

/// A characteristic and its value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicValue {
    pub characteristic_uuid: Uuid,
    pub data: Vec<u8>,
}

impl MessageCodec for ReadCharacteristic {
    const MSG_ID: u8 = 0x03;
    type Request = CharacteristicQuery;
    type Response = CharacteristicValue;

    fn build_request_body(request: &CharacteristicQuery) -> Vec<u8> {
        request.characteristic_uuid.as_bytes().to_vec()
    }

    fn parse_request_body(body: &[u8]) -> MessageResult<CharacteristicQuery> {
        expect_len(body, UUID_LEN)?;
        Ok(CharacteristicQuery {
            characteristic_uuid: read_uuid(body, 0)?,
        })
    }

    fn build_response_body(response: &CharacteristicValue) -> Vec<u8> {
        let mut body = Vec::with_capacity(UUID_LEN + response.data.len());
        body.extend_from_slice(response.characteristic_uuid.as_bytes());
        body.extend_from_slice(&response.data);
        body
    }

    fn parse_response_body(body: &[u8]) -> MessageResult<CharacteristicValue> {
        let characteristic_uuid = read_uuid(body, 0)?;
        Ok(CharacteristicValue {
            characteristic_uuid,
            data: body[UUID_LEN..].to_vec(),
        })
    }
}

/// Write raw bytes to one characteristic.
pub struct WriteCharacteristic;

/// The characteristic and the raw bytes to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicWrite {
    pub characteristic_uuid: Uuid,
    pub data: Vec<u8>,
}

/// Acknowledgement carrying the characteristic identifier alone, no
/// payload echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicAck {
    pub characteristic_uuid: Uuid,
}

impl MessageCodec for WriteCharacteristic {
    const MSG_ID: u8 = 0x04;
    type Request = CharacteristicWrite;
    type Response = CharacteristicAck;

    fn build_request_body(request: &CharacteristicWrite) -> Vec<u8> {
        let mut body = Vec::with_capacity(UUID_LEN + request.data.len());
        body.extend_from_slice(request.characteristic_uuid.as_bytes());
        body.extend_from_slice(&request.data);
        body
    }

    fn parse_request_body(body: &[u8]) -> MessageResult<CharacteristicWrite> {
        let characteristic_uuid = read_uuid(body, 0)?;
        Ok(CharacteristicWrite {
            characteristic_uuid,
            data: body[UUID_LEN..].to_vec(),
        })
    }

    fn build_response_body(response: &CharacteristicAck) -> Vec<u8> {
        response.characteristic_uuid.as_bytes().to_vec()
    }

    fn parse_response_body(body: &[u8]) -> MessageResult<CharacteristicAck> {
        expect_len(body, UUID_LEN)?;
        Ok(CharacteristicAck {
            characteristic_uuid: read_uuid(body, 0)?,
        })
    }
}

/// Enable or disable notifications on one characteristic.
pub struct EnableCharacteristicNotifications;

/// The characteristic and the desired notification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationToggle {
    pub characteristic_uuid: Uuid,
    pub enable: bool,
}

impl MessageCodec for EnableCharacteristicNotifications {
    const MSG_ID: u8 = 0x05;
    type Request = NotificationToggle;
    type Response = CharacteristicAck;

    fn build_request_body(request: &NotificationToggle) -> Vec<u8> {
        let mut body = Vec::with_capacity(UUID_LEN + 1);
        body.extend_from_slice(request.characteristic_uuid.as_bytes());
        body.push(u8::from(request.enable));
        body
    }

    fn parse_request_body(body: &[u8]) -> MessageResult<NotificationToggle> {
        expect_len(body, UUID_LEN + 1)?;
        Ok(NotificationToggle {
            characteristic_uuid: read_uuid(body, 0)?,
            enable: body[UUID_LEN] != 0,
        })
    }

    fn build_response_body(response: &CharacteristicAck) -> Vec<u8> {
        response.characteristic_uuid.as_bytes().to_vec()
    }

    fn parse_response_body(body: &[u8]) -> MessageResult<CharacteristicAck> {
        expect_len(body, UUID_LEN)?;
        Ok(CharacteristicAck {
            characteristic_uuid: read_uuid(body, 0)?,
        })
    }
}

/// Unsolicited value push for a notification-enabled characteristic.
/// Initiated by the responder; carries no response body.
pub struct CharacteristicNotification;

impl MessageCodec for CharacteristicNotification {
    const MSG_ID: u8 = 0x06;
    type Request = CharacteristicValue;
    type Response = ();

    fn build_request_body(request: &CharacteristicValue) -> Vec<u8> {
        let mut body = Vec::with_capacity(UUID_LEN + request.data.len());
        body.extend_from_slice(request.characteristic_uuid.as_bytes());
        body.extend_from_slice(&request.data);
        body
    }

    fn parse_request_body(body: &[u8]) -> MessageResult<CharacteristicValue> {
        let characteristic_uuid = read_uuid(body, 0)?;
        Ok(CharacteristicValue {
            characteristic_uuid,
            data: body[UUID_LEN..].to_vec(),
        })
    }

    fn build_response_body(_response: &()) -> Vec<u8> {
        Vec::new()
    }

    fn parse_response_body(body: &[u8]) -> MessageResult<()> {
        expect_len(body, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(tag: u8) -> Uuid {
        Uuid::from_bytes([tag; UUID_LEN])
    }

    #[test]
    fn test_discover_services_round_trip() {
        for count in 0..4 {
            let list = ServiceList {
                services: (0..count).map(|n| uuid(n as u8 + 1)).collect(),
            };
            let body = DiscoverServices::build_response_body(&list);
            assert_eq!(body.len(), count * UUID_LEN);

            let parsed = DiscoverServices::parse_response_body(&body).unwrap();
            assert_eq!(parsed, list);
        }
    }

    #[test]
    fn test_discover_services_rejects_partial_stride() {
        let err = DiscoverServices::parse_response_body(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, MessageError::InvalidLength { .. }));
    }

    #[test]
    fn test_discover_services_request_has_no_body() {
        assert!(DiscoverServices::build_request_body(&()).is_empty());
        assert!(DiscoverServices::parse_request_body(&[]).is_ok());
        assert!(DiscoverServices::parse_request_body(&[0]).is_err());
    }

    #[test]
    fn test_discover_characteristics_round_trip() {
        let list = CharacteristicList {
            service_uuid: uuid(0x18),
            characteristics: vec![
                CharacteristicDefinition {
                    uuid: uuid(0x2a),
                    properties: 0x12,
                },
                CharacteristicDefinition {
                    uuid: uuid(0x2b),
                    properties: 0x08,
                },
            ],
        };
        let body = DiscoverCharacteristics::build_response_body(&list);
        assert_eq!(body.len(), UUID_LEN + 2 * (UUID_LEN + 1));
        let parsed = DiscoverCharacteristics::parse_response_body(&body).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_write_request_round_trip() {
        let write = CharacteristicWrite {
            characteristic_uuid: uuid(0x2a),
            data: vec![0x05, 0x64, 0x00],
        };
        let body = WriteCharacteristic::build_request_body(&write);
        let parsed = WriteCharacteristic::parse_request_body(&body).unwrap();
        assert_eq!(parsed, write);
    }

    #[test]
    fn test_write_response_is_ack_only() {
        let ack = CharacteristicAck {
            characteristic_uuid: uuid(0x2a),
        };
        let body = WriteCharacteristic::build_response_body(&ack);
        assert_eq!(body.len(), UUID_LEN);
        assert_eq!(WriteCharacteristic::parse_response_body(&body).unwrap(), ack);

        // a payload echo is rejected
        let mut echoed = body.clone();
        echoed.push(0xff);
        assert!(WriteCharacteristic::parse_response_body(&echoed).is_err());
    }

    #[test]
    fn test_notification_toggle_round_trip() {
        for enable in [true, false] {
            let toggle = NotificationToggle {
                characteristic_uuid: uuid(0x2c),
                enable,
            };
            let body = EnableCharacteristicNotifications::build_request_body(&toggle);
            let parsed = EnableCharacteristicNotifications::parse_request_body(&body).unwrap();
            assert_eq!(parsed, toggle);
        }
    }

    #[test]
    fn test_notification_value_round_trip() {
        let value = CharacteristicValue {
            characteristic_uuid: uuid(0x2d),
            data: vec![0x10, 0x20, 0x30, 0x40],
        };
        let body = CharacteristicNotification::build_request_body(&value);
        let parsed = CharacteristicNotification::parse_request_body(&body).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_frame_parse_verifies_type_id_first() {
        // a write-characteristic frame handed to the read codec fails on
        // the type id, before any body parsing
        let header = MessageHeader::request(WriteCharacteristic::MSG_ID, 5);
        let frame = header.encode(&WriteCharacteristic::build_request_body(
            &CharacteristicWrite {
                characteristic_uuid: uuid(0x2a),
                data: vec![0x01],
            },
        ));

        let err = ReadCharacteristic::parse_request_frame(&frame).unwrap_err();
        assert_eq!(
            err,
            MessageError::InvalidType {
                expected: ReadCharacteristic::MSG_ID,
                actual: WriteCharacteristic::MSG_ID
            }
        );

        let (parsed_header, write) = WriteCharacteristic::parse_request_frame(&frame).unwrap();
        assert_eq!(parsed_header.seq, 5);
        assert_eq!(write.data, vec![0x01]);
    }

    #[test]
    fn test_truncated_uuid_rejected() {
        let err = ReadCharacteristic::parse_request_body(&[0u8; 7]).unwrap_err();
        assert_eq!(
            err,
            MessageError::InvalidLength {
                expected: UUID_LEN,
                actual: 7
            }
        );
    }
}
