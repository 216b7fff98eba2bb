// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Client transport seams
//!
//! Everything the protocol actors need from the network, without the network:
//!
//! - [`ClientOutput`] and [`ClientRequest`]: non-blocking request/response and
//!   fire-and-forget messages towards a [`RemoteAddress`].
//! - [`InboundMessages`]: polled source of pushed frames, implemented by the
//!   read side of the [`ring_buffer`].
//! - [`TransportListener`]: connection lifecycle notifications.
//! - Message framing: a fixed 8-byte [`MessageHeader`] followed by a bincode
//!   body, and typed [`RequestError`]s for failed round trips.
//! - [`MemoryOutput`]: an output that keeps everything in memory.
//!

mod address;
mod dispatcher;
mod error;
mod header;
mod memory;
mod output;
mod ring;

pub use address::RemoteAddress;
pub use dispatcher::{Claim, ClaimedRegion, Dispatcher, write_frame};
pub use error::{Error, ErrorCode, RequestError};
pub use header::{
    CLIENT_SCHEMA_ID, CONTROL_MESSAGE_REQUEST_TEMPLATE, ERROR_RESPONSE_TEMPLATE,
    ErrorResponse, HEADER_LENGTH, MessageHeader,
    OPEN_SUBSCRIPTION_RESPONSE_TEMPLATE, SCHEMA_VERSION,
    SUBSCRIBED_EVENT_TEMPLATE, TOPOLOGY_RESPONSE_TEMPLATE, decode_message,
    decode_response, encode_message, split_message,
};
pub use memory::{MemoryOutput, RecordedRequest};
pub use output::{
    ClientOutput, ClientRequest, InboundMessages, TransportListener,
};
pub use ring::{
    Consumer, DEFAULT_FRAMES_PER_POLL, FRAME_ALIGNMENT, FRAME_HEADER_LENGTH,
    Producer, aligned_frame_length, ring_buffer,
};
