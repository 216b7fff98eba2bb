// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Message framing
//!
//! Every message starts with a fixed 8-byte header followed by a bincode body:
//!
//! | offset | field          | type   |
//! |--------|----------------|--------|
//! | 0      | `block_length` | u16 LE |
//! | 2      | `template_id`  | u16 LE |
//! | 4      | `schema_id`    | u16 LE |
//! | 6      | `version`      | u16 LE |
//!
//! `block_length` is the length of the body in bytes. Receivers read the
//! header first and only decode the body when schema and template match what
//! they expect.
//!

use crate::{Error, RequestError, error::ErrorCode};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Encoded length of [`MessageHeader`].
pub const HEADER_LENGTH: usize = 8;

/// Schema of all client protocol messages.
pub const CLIENT_SCHEMA_ID: u16 = 0;
/// Current version of the client schema.
pub const SCHEMA_VERSION: u16 = 1;

/// Error response, body is [`ErrorResponse`].
pub const ERROR_RESPONSE_TEMPLATE: u16 = 10;
/// Control request, body is a `ControlMessage`.
pub const CONTROL_MESSAGE_REQUEST_TEMPLATE: u16 = 20;
/// Topology response.
pub const TOPOLOGY_RESPONSE_TEMPLATE: u16 = 21;
/// Open-subscription response.
pub const OPEN_SUBSCRIPTION_RESPONSE_TEMPLATE: u16 = 22;
/// Event pushed to a subscriber.
pub const SUBSCRIBED_EVENT_TEMPLATE: u16 = 30;

/// The fixed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub block_length: u16,
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
}

impl MessageHeader {
    /// Header for a client schema message.
    pub fn new(template_id: u16, block_length: u16) -> Self {
        MessageHeader {
            block_length,
            template_id,
            schema_id: CLIENT_SCHEMA_ID,
            version: SCHEMA_VERSION,
        }
    }

    pub fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.block_length.to_le_bytes());
        buffer.extend_from_slice(&self.template_id.to_le_bytes());
        buffer.extend_from_slice(&self.schema_id.to_le_bytes());
        buffer.extend_from_slice(&self.version.to_le_bytes());
    }

    /// Reads a header from the start of `buffer`.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] when the buffer is shorter than [`HEADER_LENGTH`].
    pub fn decode(buffer: &[u8]) -> Result<Self, Error> {
        if buffer.len() < HEADER_LENGTH {
            return Err(Error::Decode(format!(
                "Message of {} bytes is shorter than its header.",
                buffer.len()
            )));
        }
        let field = |at: usize| u16::from_le_bytes([buffer[at], buffer[at + 1]]);
        Ok(MessageHeader {
            block_length: field(0),
            template_id: field(2),
            schema_id: field(4),
            version: field(6),
        })
    }

    /// Whether this header announces `template_id` in the client schema.
    pub fn is(&self, template_id: u16) -> bool {
        self.schema_id == CLIENT_SCHEMA_ID && self.template_id == template_id
    }
}

/// Body of an [`ERROR_RESPONSE_TEMPLATE`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

/// Encodes header and body into one message.
///
/// # Errors
///
/// [`Error::Encode`] when bincode fails, [`Error::FrameTooLarge`] when the
/// body does not fit the header's length field.
pub fn encode_message<T: Serialize>(
    template_id: u16,
    body: &T,
) -> Result<Vec<u8>, Error> {
    let encoded =
        bincode::serialize(body).map_err(|e| Error::Encode(e.to_string()))?;
    let block_length =
        u16::try_from(encoded.len()).map_err(|_| Error::FrameTooLarge {
            length: encoded.len(),
            max: u16::MAX as usize,
        })?;
    let mut buffer = Vec::with_capacity(HEADER_LENGTH + encoded.len());
    MessageHeader::new(template_id, block_length).encode(&mut buffer);
    buffer.extend_from_slice(&encoded);
    Ok(buffer)
}

/// Splits a message into its header and the body announced by it.
///
/// # Errors
///
/// [`Error::Decode`] when the header is missing or the body is truncated.
pub fn split_message(buffer: &[u8]) -> Result<(MessageHeader, &[u8]), Error> {
    let header = MessageHeader::decode(buffer)?;
    let end = HEADER_LENGTH + header.block_length as usize;
    if buffer.len() < end {
        return Err(Error::Decode(format!(
            "Body announces {} bytes but only {} are present.",
            header.block_length,
            buffer.len() - HEADER_LENGTH
        )));
    }
    Ok((header, &buffer[HEADER_LENGTH..end]))
}

/// Decodes a message body, which must carry `template_id`.
///
/// # Errors
///
/// [`Error::Decode`] for an unexpected template or a malformed body.
pub fn decode_message<T: DeserializeOwned>(
    buffer: &[u8],
    template_id: u16,
) -> Result<T, Error> {
    let (header, body) = split_message(buffer)?;
    if !header.is(template_id) {
        return Err(Error::Decode(format!(
            "Expected template {} but got schema {} template {}.",
            template_id, header.schema_id, header.template_id
        )));
    }
    bincode::deserialize(body).map_err(|e| Error::Decode(e.to_string()))
}

/// Decodes a response to a request.
///
/// The header is checked first: the expected template decodes into `T`, an
/// error response becomes [`RequestError::BrokerRejected`], anything else is
/// [`RequestError::UnexpectedFormat`].
///
/// # Errors
///
/// See above, plus [`RequestError::Malformed`] when header or body can't be
/// read.
pub fn decode_response<T: DeserializeOwned>(
    buffer: &[u8],
    expected_template: u16,
) -> Result<T, RequestError> {
    let (header, body) = split_message(buffer)
        .map_err(|e| RequestError::Malformed(e.to_string()))?;
    if header.is(expected_template) {
        bincode::deserialize(body).map_err(|e| {
            RequestError::Malformed(format!(
                "Unable to decode response body: {}",
                e
            ))
        })
    } else if header.is(ERROR_RESPONSE_TEMPLATE) {
        let error: ErrorResponse = bincode::deserialize(body).map_err(|e| {
            RequestError::Malformed(format!(
                "Unable to decode error response: {}",
                e
            ))
        })?;
        Err(RequestError::BrokerRejected {
            code: error.code,
            message: error.message,
        })
    } else {
        Err(RequestError::UnexpectedFormat {
            schema_id: header.schema_id,
            template_id: header.template_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        sequence: u64,
        origin: String,
    }

    fn ping() -> Ping {
        Ping {
            sequence: 7,
            origin: "client".to_owned(),
        }
    }

    #[test]
    fn test_header_layout() {
        let mut buffer = Vec::new();
        MessageHeader::new(TOPOLOGY_RESPONSE_TEMPLATE, 258).encode(&mut buffer);
        assert_eq!(buffer, vec![2, 1, 21, 0, 0, 0, 1, 0]);
        assert_eq!(
            MessageHeader::decode(&buffer).unwrap(),
            MessageHeader {
                block_length: 258,
                template_id: TOPOLOGY_RESPONSE_TEMPLATE,
                schema_id: CLIENT_SCHEMA_ID,
                version: SCHEMA_VERSION,
            }
        );
    }

    #[test]
    fn test_short_header_is_rejected() {
        assert!(matches!(
            MessageHeader::decode(&[1, 2, 3]),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_decode_expected_response() {
        let message = encode_message(TOPOLOGY_RESPONSE_TEMPLATE, &ping()).unwrap();
        let decoded: Ping =
            decode_response(&message, TOPOLOGY_RESPONSE_TEMPLATE).unwrap();
        assert_eq!(decoded, ping());
    }

    #[test]
    fn test_decode_error_response() {
        let message = encode_message(
            ERROR_RESPONSE_TEMPLATE,
            &ErrorResponse {
                code: ErrorCode::PartitionNotFound,
                message: "no partition 3".to_owned(),
            },
        )
        .unwrap();
        let result: Result<Ping, _> =
            decode_response(&message, TOPOLOGY_RESPONSE_TEMPLATE);
        assert_eq!(
            result,
            Err(RequestError::BrokerRejected {
                code: ErrorCode::PartitionNotFound,
                message: "no partition 3".to_owned(),
            })
        );
    }

    #[test]
    fn test_decode_unexpected_template() {
        let message =
            encode_message(OPEN_SUBSCRIPTION_RESPONSE_TEMPLATE, &ping()).unwrap();
        let result: Result<Ping, _> =
            decode_response(&message, TOPOLOGY_RESPONSE_TEMPLATE);
        assert_eq!(
            result,
            Err(RequestError::UnexpectedFormat {
                schema_id: CLIENT_SCHEMA_ID,
                template_id: OPEN_SUBSCRIPTION_RESPONSE_TEMPLATE,
            })
        );
    }

    #[test]
    fn test_decode_malformed_body() {
        let mut message = Vec::new();
        MessageHeader::new(TOPOLOGY_RESPONSE_TEMPLATE, 2).encode(&mut message);
        message.extend_from_slice(&[0xff, 0xff]);
        let result: Result<Ping, _> =
            decode_response(&message, TOPOLOGY_RESPONSE_TEMPLATE);
        assert!(matches!(result, Err(RequestError::Malformed(_))));
    }

    #[test]
    fn test_truncated_body() {
        let mut message =
            encode_message(SUBSCRIBED_EVENT_TEMPLATE, &ping()).unwrap();
        message.truncate(message.len() - 1);
        assert!(matches!(
            decode_message::<Ping>(&message, SUBSCRIBED_EVENT_TEMPLATE),
            Err(Error::Decode(_))
        ));
    }
}
