//! Request/response channel over one Direct Connect socket.
//!
//! A channel exclusively owns one transport stream: one socket per peer,
//! never multiplexed. Outbound GATT-style operations are serialized into
//! request frames with a monotonically increasing sequence number;
//! inbound buffers are parsed back into responses or notifications. A
//! malformed inbound buffer is answered with an error response and
//! processing continues with the next buffer -- codec failures are fatal
//! to the buffer, never to the connection.

use tracing::{debug, warn};
use velolink_core::Queue;

use super::factory::{build_error_response, build_request, parse_response, MessageType, Request, Response};
use super::message::{MessageError, MessageHeader, HEADER_LEN};
use super::messages::{CharacteristicNotification, CharacteristicValue, MessageCodec};
use crate::context::TransportStream;
use crate::device::{DeviceError, DeviceResult};

/// Response status codes.
pub mod status {
    /// Operation succeeded.
    pub const SUCCESS: u8 = 0x00;
    /// Message-type id outside the supported set.
    pub const UNKNOWN_MESSAGE_TYPE: u8 = 0x01;
    /// Malformed header or body.
    pub const MALFORMED_MESSAGE: u8 = 0x02;
    /// Operation could not be completed.
    pub const UNEXPECTED_ERROR: u8 = 0x03;
}

/// Handler invoked for every decoded characteristic notification.
pub type NotificationHandler = Box<dyn Fn(&CharacteristicValue) + Send + Sync>;

fn status_for(err: &MessageError) -> u8 {
    match err {
        MessageError::UnknownType(_) => status::UNKNOWN_MESSAGE_TYPE,
        MessageError::InvalidLength { .. } | MessageError::InvalidType { .. } => {
            status::MALFORMED_MESSAGE
        }
    }
}

/// Initiator side of one Direct Connect connection.
pub struct DirectConnectChannel {
    stream: Box<dyn TransportStream>,
    seq: u8,
    handler: Option<NotificationHandler>,
    pending: Queue<CharacteristicValue>,
}

impl DirectConnectChannel {
    /// Wrap an exclusively owned transport stream.
    pub fn new(stream: Box<dyn TransportStream>) -> Self {
        Self {
            stream,
            seq: 0,
            handler: None,
            pending: Queue::new(),
        }
    }

    /// Install the notification handler; a later call replaces it.
    /// Notifications that arrived before a handler was installed stay
    /// buffered and are drained via
    /// [`DirectConnectChannel::take_notification`].
    pub fn on_notification(&mut self, handler: NotificationHandler) {
        self.handler = Some(handler);
    }

    /// Remove and return the oldest buffered notification.
    pub fn take_notification(&mut self) -> Option<CharacteristicValue> {
        self.pending.dequeue()
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Issue one request and wait for the matching response.
    ///
    /// Notifications interleaving with the exchange are delivered in
    /// arrival order. A non-zero response status surfaces as a
    /// communication error. There is no internal deadline; callers that
    /// need one impose it above this layer.
    pub async fn request(&mut self, request: &Request) -> DeviceResult<Response> {
        let expected = request.message_type();
        let seq = self.next_seq();
        let frame = build_request(request, seq);
        debug!(msg_id = expected.msg_id(), seq, "sending direct connect request");
        self.stream.write(&frame).await?;

        loop {
            let Some(buffer) = self.stream.read().await? else {
                return Err(DeviceError::Communication(
                    "peer closed the connection".to_string(),
                ));
            };
            if let Some((header, response)) = self.accept(&buffer).await? {
                if header.msg_id != expected.msg_id() {
                    warn!(
                        msg_id = header.msg_id,
                        expected = expected.msg_id(),
                        "out-of-order response dropped"
                    );
                    continue;
                }
                if header.status != status::SUCCESS {
                    return Err(DeviceError::Communication(format!(
                        "peer answered status 0x{:02x} for message type 0x{:02x}",
                        header.status, header.msg_id
                    )));
                }
                if let Some(response) = response {
                    return Ok(response);
                }
            }
        }
    }

    /// Read and dispatch one inbound buffer outside of an exchange.
    /// Returns `false` when the peer has closed the connection.
    pub async fn poll(&mut self) -> DeviceResult<bool> {
        let Some(buffer) = self.stream.read().await? else {
            return Ok(false);
        };
        self.accept(&buffer).await?;
        Ok(true)
    }

    /// Close the underlying stream.
    pub async fn close(&mut self) -> DeviceResult<()> {
        self.stream.close().await
    }

    /// Parse and dispatch one inbound buffer.
    ///
    /// Notifications are delivered to the handler (or buffered) and
    /// yield `None`. An error-status frame yields its header with no
    /// body: error responses echo the request body, which does not parse
    /// as a response. Codec failures are answered with an error response
    /// and absorbed; only transport failures propagate.
    async fn accept(
        &mut self,
        buffer: &[u8],
    ) -> DeviceResult<Option<(MessageHeader, Option<Response>)>> {
        let header = match MessageHeader::parse(buffer) {
            Ok(header) => header,
            Err(err) => {
                // Too short to carry a header; there is nothing to
                // correlate an error response to.
                warn!(%err, len = buffer.len(), "dropping undersized inbound buffer");
                return Ok(None);
            }
        };

        let kind = match MessageType::from_id(header.msg_id) {
            Ok(kind) => kind,
            Err(err) => {
                warn!(%err, "rejecting inbound buffer");
                self.answer_error(buffer, &err).await?;
                return Ok(None);
            }
        };

        if kind == MessageType::CharacteristicNotification {
            match CharacteristicNotification::parse_request_body(&buffer[HEADER_LEN..]) {
                Ok(value) => self.deliver(value),
                Err(err) => {
                    warn!(%err, "rejecting malformed notification");
                    self.answer_error(buffer, &err).await?;
                }
            }
            return Ok(None);
        }

        if header.status != status::SUCCESS {
            return Ok(Some((header, None)));
        }

        match parse_response(buffer) {
            Ok((header, response)) => Ok(Some((header, Some(response)))),
            Err(err) => {
                warn!(%err, "rejecting malformed response");
                self.answer_error(buffer, &err).await?;
                Ok(None)
            }
        }
    }

    async fn answer_error(&mut self, buffer: &[u8], err: &MessageError) -> DeviceResult<()> {
        let frame = build_error_response(buffer, status_for(err))?;
        self.stream.write(&frame).await
    }

    fn deliver(&mut self, value: CharacteristicValue) {
        match &self.handler {
            Some(handler) => handler(&value),
            None => self.pending.enqueue(value),
        }
    }
}
