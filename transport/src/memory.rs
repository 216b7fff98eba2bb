// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Memory transport implementation.
//!
//! [`MemoryOutput`] records every request and message instead of sending it.
//! The embedding side (an in-process broker or a test) answers recorded
//! requests through their [`RecordedRequest`] handle.
//!

use crate::{ClientOutput, ClientRequest, RemoteAddress, RequestError};

use parking_lot::Mutex;

use std::sync::Arc;

#[derive(Debug, Default)]
struct RequestSlot {
    response: Option<Result<Vec<u8>, RequestError>>,
    closed: bool,
}

/// A request issued through a [`MemoryOutput`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    remote: RemoteAddress,
    payload: Vec<u8>,
    slot: Arc<Mutex<RequestSlot>>,
}

impl RecordedRequest {
    pub fn remote(&self) -> &RemoteAddress {
        &self.remote
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Completes the request with `response`.
    pub fn respond(&self, response: Vec<u8>) {
        self.slot.lock().response = Some(Ok(response));
    }

    /// Completes the request with a failure.
    pub fn fail(&self, error: RequestError) {
        self.slot.lock().response = Some(Err(error));
    }

    /// Whether the issuer closed the request.
    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }
}

#[derive(Debug)]
struct MemoryRequest {
    slot: Arc<Mutex<RequestSlot>>,
}

impl ClientRequest for MemoryRequest {
    fn is_done(&self) -> bool {
        self.slot.lock().response.is_some()
    }

    fn take_response(&mut self) -> Result<Vec<u8>, RequestError> {
        self.slot.lock().response.take().unwrap_or_else(|| {
            Err(RequestError::Transport("No response available.".to_owned()))
        })
    }

    fn close(&mut self) {
        self.slot.lock().closed = true;
    }
}

#[derive(Debug)]
struct MemoryState {
    available: bool,
    requests: Vec<RecordedRequest>,
    messages: Vec<(RemoteAddress, Vec<u8>)>,
}

impl Default for MemoryState {
    fn default() -> Self {
        MemoryState {
            available: true,
            requests: Vec::new(),
            messages: Vec::new(),
        }
    }
}

/// Output keeping everything in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryOutput {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// While unavailable, requests and messages are refused.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// All requests issued so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.lock().requests.last().cloned()
    }

    /// All fire-and-forget messages sent so far, oldest first.
    pub fn messages(&self) -> Vec<(RemoteAddress, Vec<u8>)> {
        self.state.lock().messages.clone()
    }

    /// Forgets recorded requests and messages.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.requests.clear();
        state.messages.clear();
    }
}

impl ClientOutput for MemoryOutput {
    fn send_request(
        &self,
        remote: &RemoteAddress,
        payload: Vec<u8>,
    ) -> Option<Box<dyn ClientRequest>> {
        let mut state = self.state.lock();
        if !state.available {
            return None;
        }
        let slot = Arc::new(Mutex::new(RequestSlot::default()));
        state.requests.push(RecordedRequest {
            remote: remote.clone(),
            payload,
            slot: slot.clone(),
        });
        Some(Box::new(MemoryRequest { slot }))
    }

    fn send_message(&self, remote: &RemoteAddress, payload: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        if !state.available {
            return false;
        }
        state.messages.push((remote.clone(), payload));
        true
    }
}
