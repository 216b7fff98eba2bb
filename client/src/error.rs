// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use transport::RequestError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client error type.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A builder or call was given an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A request round trip failed.
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),
    /// The actor runtime refused an operation.
    #[error("Actor runtime error: {0}")]
    Actor(#[from] actor::Error),
    /// Framing or buffer error.
    #[error("Transport error: {0}")]
    Transport(#[from] transport::Error),
    /// An event handler failed.
    #[error("Handler error: {0}")]
    Handler(String),
    /// The component was closed.
    #[error("Closed.")]
    Closed,
}
