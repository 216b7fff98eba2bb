// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Transport seams
//!
//! The protocol actors never touch sockets. They talk to the network through
//! the traits in this module, all of which are non-blocking: a request is
//! issued, then polled for completion from later work slices.
//!

use crate::{RemoteAddress, RequestError};

/// Outgoing side of the client transport.
pub trait ClientOutput: Send + Sync {
    /// Issues a request to `remote`.
    ///
    /// # Returns
    ///
    /// `None` when the output cannot take the request right now. The caller
    /// should retry from a later work slice.
    fn send_request(
        &self,
        remote: &RemoteAddress,
        payload: Vec<u8>,
    ) -> Option<Box<dyn ClientRequest>>;

    /// Sends a message that expects no response.
    ///
    /// # Returns
    ///
    /// `false` when the message could not be queued.
    fn send_message(&self, remote: &RemoteAddress, payload: Vec<u8>) -> bool;
}

/// An in-flight request.
pub trait ClientRequest: Send {
    /// Whether a response (or a transport failure) is available.
    fn is_done(&self) -> bool;

    /// Takes the response once [`ClientRequest::is_done`] returned true.
    ///
    /// # Errors
    ///
    /// [`RequestError::Transport`] when the request failed in the transport
    /// or no response is available yet.
    fn take_response(&mut self) -> Result<Vec<u8>, RequestError>;

    /// Releases the request. Late responses are discarded.
    fn close(&mut self);
}

/// Polled source of inbound frames.
pub trait InboundMessages: Send {
    /// Hands every available frame to `handler`.
    ///
    /// # Returns
    ///
    /// The number of frames handed over.
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8])) -> usize;
}

/// Connection lifecycle notifications.
pub trait TransportListener: Send + Sync {
    fn on_connection_established(&self, _remote: &RemoteAddress) {}

    fn on_connection_closed(&self, remote: &RemoteAddress);
}
