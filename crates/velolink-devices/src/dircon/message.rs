//! Message framing: the fixed six-byte Direct Connect header.

use thiserror::Error;

/// Length of the fixed message header.
pub const HEADER_LEN: usize = 6;

/// Result type for codec operations.
pub type MessageResult<T> = Result<T, MessageError>;

/// Direct Connect codec validation failure.
///
/// Fatal only to the single inbound buffer, never to the connection: the
/// transport handler answers with an error response built via
/// [`crate::dircon::build_error_response`] and keeps processing
/// subsequent buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Buffer too short for the header or the type-specific body
    #[error("Invalid message length: {actual}, expected at least {expected}")]
    InvalidLength { expected: usize, actual: usize },

    /// Header message-type id does not match the expected type
    #[error("Invalid message type: {actual}, expected {expected}")]
    InvalidType { expected: u8, actual: u8 },

    /// Message-type id outside the closed Direct Connect set
    #[error("Unknown message type: {0}")]
    UnknownType(u8),
}

/// Fixed header carried by every Direct Connect message.
///
/// Bytes 0 (envelope/version flag) and 2 (sequence number) are owned by
/// the outer transport framer and passed through unchanged. Byte 3 must
/// be 0 on a request and carries the result code on a response. Bytes
/// 4-5 hold the body length on encode; decoding takes the body from the
/// buffer remainder and does not re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Envelope/version flag (framer-owned passthrough)
    pub envelope: u8,
    /// Message-type id
    pub msg_id: u8,
    /// Sequence number (framer-owned passthrough)
    pub seq: u8,
    /// Status byte: 0 on requests, result code on responses
    pub status: u8,
}

impl MessageHeader {
    /// Header for an outbound request of the given type.
    pub fn request(msg_id: u8, seq: u8) -> Self {
        Self {
            envelope: 0,
            msg_id,
            seq,
            status: 0,
        }
    }

    /// Header for an outbound response echoing a request header.
    pub fn response(request: &MessageHeader, status: u8) -> Self {
        Self { status, ..*request }
    }

    /// Parse the header from an inbound buffer.
    pub fn parse(buffer: &[u8]) -> MessageResult<Self> {
        if buffer.len() < HEADER_LEN {
            return Err(MessageError::InvalidLength {
                expected: HEADER_LEN,
                actual: buffer.len(),
            });
        }
        Ok(Self {
            envelope: buffer[0],
            msg_id: buffer[1],
            seq: buffer[2],
            status: buffer[3],
        })
    }

    /// Check that this header carries the expected message-type id.
    /// Must pass before any body parsing is attempted.
    pub fn verify(&self, expected_id: u8) -> MessageResult<()> {
        if self.msg_id != expected_id {
            return Err(MessageError::InvalidType {
                expected: expected_id,
                actual: self.msg_id,
            });
        }
        Ok(())
    }

    /// Encode the header and body into one framed buffer.
    pub fn encode(&self, body: &[u8]) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_LEN + body.len());
        buffer.push(self.envelope);
        buffer.push(self.msg_id);
        buffer.push(self.seq);
        buffer.push(self.status);
        buffer.extend_from_slice(&(body.len() as u16).to_be_bytes());
        buffer.extend_from_slice(body);
        buffer
    }
}

/// Body bytes of a framed buffer, after the fixed header.
pub fn body(buffer: &[u8]) -> MessageResult<&[u8]> {
    if buffer.len() < HEADER_LEN {
        return Err(MessageError::InvalidLength {
            expected: HEADER_LEN,
            actual: buffer.len(),
        });
    }
    Ok(&buffer[HEADER_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_short_buffer() {
        for len in 0..HEADER_LEN {
            let buffer = vec![0u8; len];
            let err = MessageHeader::parse(&buffer).unwrap_err();
            assert_eq!(
                err,
                MessageError::InvalidLength {
                    expected: HEADER_LEN,
                    actual: len
                }
            );
        }
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let header = MessageHeader {
            envelope: 0x01,
            msg_id: 0x03,
            seq: 0x2a,
            status: 0x00,
        };
        let frame = header.encode(&[0xde, 0xad]);
        assert_eq!(frame.len(), HEADER_LEN + 2);
        // length field holds the body length, big-endian
        assert_eq!(&frame[4..6], &[0x00, 0x02]);

        let parsed = MessageHeader::parse(&frame).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(body(&frame).unwrap(), &[0xde, 0xad]);
    }

    #[test]
    fn test_verify_mismatch() {
        let header = MessageHeader::request(0x04, 0);
        assert!(header.verify(0x04).is_ok());
        assert_eq!(
            header.verify(0x01).unwrap_err(),
            MessageError::InvalidType {
                expected: 0x01,
                actual: 0x04
            }
        );
    }

    #[test]
    fn test_response_echoes_request_header() {
        let request = MessageHeader {
            envelope: 0x01,
            msg_id: 0x02,
            seq: 0x77,
            status: 0x00,
        };
        let response = MessageHeader::response(&request, 0x03);
        assert_eq!(response.envelope, request.envelope);
        assert_eq!(response.msg_id, request.msg_id);
        assert_eq!(response.seq, request.seq);
        assert_eq!(response.status, 0x03);
    }
}
