//! Message factory: the closed type-id mapping and frame-level dispatch.
//!
//! [`MessageType::from_id`] is the sole extension point for new message
//! types; any id outside the set fails with an unknown-type error.
//! [`parse_request`]/[`parse_response`] turn a full inbound frame into a
//! typed value, and [`build_error_response`] answers a rejected request
//! without losing the correlation carried in its header.

use super::message::{self, MessageError, MessageHeader, MessageResult, HEADER_LEN};
use super::messages::{
    CharacteristicAck, CharacteristicList, CharacteristicNotification, CharacteristicQuery,
    CharacteristicValue, CharacteristicWrite, DiscoverCharacteristics, DiscoverServices,
    EnableCharacteristicNotifications, MessageCodec, NotificationToggle, ReadCharacteristic,
    ServiceList, ServiceQuery, WriteCharacteristic,
};

/// The closed set of Direct Connect message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    DiscoverServices,
    DiscoverCharacteristics,
    ReadCharacteristic,
    WriteCharacteristic,
    EnableCharacteristicNotifications,
    CharacteristicNotification,
}

impl MessageType {
    /// Map a wire id to a message type. Ids outside the closed set fail
    /// with [`MessageError::UnknownType`].
    pub fn from_id(msg_id: u8) -> MessageResult<Self> {
        match msg_id {
            DiscoverServices::MSG_ID => Ok(Self::DiscoverServices),
            DiscoverCharacteristics::MSG_ID => Ok(Self::DiscoverCharacteristics),
            ReadCharacteristic::MSG_ID => Ok(Self::ReadCharacteristic),
            WriteCharacteristic::MSG_ID => Ok(Self::WriteCharacteristic),
            EnableCharacteristicNotifications::MSG_ID => {
                Ok(Self::EnableCharacteristicNotifications)
            }
            CharacteristicNotification::MSG_ID => Ok(Self::CharacteristicNotification),
            other => Err(MessageError::UnknownType(other)),
        }
    }

    /// Validate the minimum length of `buffer`, then read its type id.
    pub fn from_buffer(buffer: &[u8]) -> MessageResult<Self> {
        let header = MessageHeader::parse(buffer)?;
        Self::from_id(header.msg_id)
    }

    /// The wire id of this message type.
    pub fn msg_id(self) -> u8 {
        match self {
            Self::DiscoverServices => DiscoverServices::MSG_ID,
            Self::DiscoverCharacteristics => DiscoverCharacteristics::MSG_ID,
            Self::ReadCharacteristic => ReadCharacteristic::MSG_ID,
            Self::WriteCharacteristic => WriteCharacteristic::MSG_ID,
            Self::EnableCharacteristicNotifications => EnableCharacteristicNotifications::MSG_ID,
            Self::CharacteristicNotification => CharacteristicNotification::MSG_ID,
        }
    }
}

/// A typed request, one variant per message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    DiscoverServices,
    DiscoverCharacteristics(ServiceQuery),
    ReadCharacteristic(CharacteristicQuery),
    WriteCharacteristic(CharacteristicWrite),
    EnableCharacteristicNotifications(NotificationToggle),
    CharacteristicNotification(CharacteristicValue),
}

impl Request {
    /// The message type of this request.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::DiscoverServices => MessageType::DiscoverServices,
            Self::DiscoverCharacteristics(_) => MessageType::DiscoverCharacteristics,
            Self::ReadCharacteristic(_) => MessageType::ReadCharacteristic,
            Self::WriteCharacteristic(_) => MessageType::WriteCharacteristic,
            Self::EnableCharacteristicNotifications(_) => {
                MessageType::EnableCharacteristicNotifications
            }
            Self::CharacteristicNotification(_) => MessageType::CharacteristicNotification,
        }
    }
}

/// A typed response, one variant per message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    DiscoverServices(ServiceList),
    DiscoverCharacteristics(CharacteristicList),
    ReadCharacteristic(CharacteristicValue),
    WriteCharacteristic(CharacteristicAck),
    EnableCharacteristicNotifications(CharacteristicAck),
    /// Notifications are unacknowledged; the response body is empty.
    CharacteristicNotification,
}

/// Parse a full inbound request frame (header plus body).
pub fn parse_request(buffer: &[u8]) -> MessageResult<(MessageHeader, Request)> {
    let header = MessageHeader::parse(buffer)?;
    let kind = MessageType::from_id(header.msg_id)?;
    let body = message::body(buffer)?;
    let request = match kind {
        MessageType::DiscoverServices => {
            DiscoverServices::parse_request_body(body)?;
            Request::DiscoverServices
        }
        MessageType::DiscoverCharacteristics => {
            Request::DiscoverCharacteristics(DiscoverCharacteristics::parse_request_body(body)?)
        }
        MessageType::ReadCharacteristic => {
            Request::ReadCharacteristic(ReadCharacteristic::parse_request_body(body)?)
        }
        MessageType::WriteCharacteristic => {
            Request::WriteCharacteristic(WriteCharacteristic::parse_request_body(body)?)
        }
        MessageType::EnableCharacteristicNotifications => {
            Request::EnableCharacteristicNotifications(
                EnableCharacteristicNotifications::parse_request_body(body)?,
            )
        }
        MessageType::CharacteristicNotification => {
            Request::CharacteristicNotification(CharacteristicNotification::parse_request_body(
                body,
            )?)
        }
    };
    Ok((header, request))
}

/// Parse a full inbound response frame (header plus body).
pub fn parse_response(buffer: &[u8]) -> MessageResult<(MessageHeader, Response)> {
    let header = MessageHeader::parse(buffer)?;
    let kind = MessageType::from_id(header.msg_id)?;
    let body = message::body(buffer)?;
    let response = match kind {
        MessageType::DiscoverServices => {
            Response::DiscoverServices(DiscoverServices::parse_response_body(body)?)
        }
        MessageType::DiscoverCharacteristics => {
            Response::DiscoverCharacteristics(DiscoverCharacteristics::parse_response_body(body)?)
        }
        MessageType::ReadCharacteristic => {
            Response::ReadCharacteristic(ReadCharacteristic::parse_response_body(body)?)
        }
        MessageType::WriteCharacteristic => {
            Response::WriteCharacteristic(WriteCharacteristic::parse_response_body(body)?)
        }
        MessageType::EnableCharacteristicNotifications => {
            Response::EnableCharacteristicNotifications(
                EnableCharacteristicNotifications::parse_response_body(body)?,
            )
        }
        MessageType::CharacteristicNotification => {
            CharacteristicNotification::parse_response_body(body)?;
            Response::CharacteristicNotification
        }
    };
    Ok((header, response))
}

/// Build a full request frame with the given sequence number.
pub fn build_request(request: &Request, seq: u8) -> Vec<u8> {
    let header = MessageHeader::request(request.message_type().msg_id(), seq);
    let body = match request {
        Request::DiscoverServices => DiscoverServices::build_request_body(&()),
        Request::DiscoverCharacteristics(query) => {
            DiscoverCharacteristics::build_request_body(query)
        }
        Request::ReadCharacteristic(query) => ReadCharacteristic::build_request_body(query),
        Request::WriteCharacteristic(write) => WriteCharacteristic::build_request_body(write),
        Request::EnableCharacteristicNotifications(toggle) => {
            EnableCharacteristicNotifications::build_request_body(toggle)
        }
        Request::CharacteristicNotification(value) => {
            CharacteristicNotification::build_request_body(value)
        }
    };
    header.encode(&body)
}

/// Build a full response frame answering `request_header`.
pub fn build_response(
    response: &Response,
    request_header: &MessageHeader,
    status: u8,
) -> Vec<u8> {
    let header = MessageHeader::response(request_header, status);
    let body = match response {
        Response::DiscoverServices(list) => DiscoverServices::build_response_body(list),
        Response::DiscoverCharacteristics(list) => {
            DiscoverCharacteristics::build_response_body(list)
        }
        Response::ReadCharacteristic(value) => ReadCharacteristic::build_response_body(value),
        Response::WriteCharacteristic(ack) => WriteCharacteristic::build_response_body(ack),
        Response::EnableCharacteristicNotifications(ack) => {
            EnableCharacteristicNotifications::build_response_body(ack)
        }
        Response::CharacteristicNotification => {
            CharacteristicNotification::build_response_body(&())
        }
    };
    header.encode(&body)
}

/// Clone `request` byte-for-byte and overwrite only the status byte with
/// `code`. Every other header field is preserved so the peer correlates
/// the error to its request without a separate correlation identifier.
pub fn build_error_response(request: &[u8], code: u8) -> MessageResult<Vec<u8>> {
    if request.len() < HEADER_LEN {
        return Err(MessageError::InvalidLength {
            expected: HEADER_LEN,
            actual: request.len(),
        });
    }
    let mut response = request.to_vec();
    response[3] = code;
    Ok(response)
}
