// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!
//! Two error types live here. [`Error`] covers local framing and buffer
//! failures. [`RequestError`] is the typed outcome of a request/response round
//! trip and is what user-facing APIs report.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::time::Duration;

/// Framing and buffer errors.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    /// A frame does not fit the buffer at all.
    #[error("Frame of {length} bytes exceeds the maximum of {max} bytes.")]
    FrameTooLarge { length: usize, max: usize },
    /// The buffer has no room right now.
    #[error("Buffer is full, claim failed.")]
    BufferFull,
    /// Ring buffer capacity is not usable.
    #[error("Invalid buffer capacity {0}, must be a non-zero multiple of 8.")]
    InvalidCapacity(usize),
    /// Message body could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),
    /// Message could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Broker-side error codes carried by an error response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    MessageNotSupported,
    PartitionNotFound,
    InvalidClientVersion,
    InvalidMessage,
    RequestProcessingFailure,
    SubscriptionNotFound,
}

/// Why a request did not produce the expected response.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestError {
    /// No response before the deadline.
    #[error("Request timed out after {0:?}.")]
    Timeout(Duration),
    /// The broker answered with an error response.
    #[error("Broker rejected the request ({code:?}): {message}")]
    BrokerRejected { code: ErrorCode, message: String },
    /// The response carried an unknown schema or template.
    #[error(
        "Unexpected response format, schema {schema_id} template {template_id}."
    )]
    UnexpectedFormat { schema_id: u16, template_id: u16 },
    /// The response header was fine but the body could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// The request failed in the transport, e.g. the connection dropped.
    #[error("Transport failure: {0}")]
    Transport(String),
    /// No leader is known for the target partition.
    #[error("No leader known for topic {topic} partition {partition}.")]
    NoLeader { topic: String, partition: u32 },
    /// The component issuing the request was closed first.
    #[error("Request cancelled, the component was closed.")]
    Closed,
}

impl RequestError {
    /// Whether repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Timeout(_)
                | RequestError::Transport(_)
                | RequestError::NoLeader { .. }
        )
    }
}
