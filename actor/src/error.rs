// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the actor runtime.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The scheduler no longer accepts actors.
    #[error("Actor scheduler '{0}' is closed.")]
    SchedulerClosed(String),
    /// A runner thread could not be started.
    #[error("Can't start runner thread: {0}")]
    Start(String),
    /// No transition is declared for the current state and code.
    #[error("No transition from state {state} with code {code}.")]
    NoTransition {
        /// Debug rendering of the state the machine was in.
        state: String,
        /// The transition code that was requested.
        code: u32,
    },
    /// A transition or the initial state references a state that was never registered.
    #[error("State {0} is not registered in the state machine.")]
    UnknownState(String),
    /// An actor panicked inside its work slice.
    #[error("Actor {actor} panicked: {message}")]
    Panicked {
        /// Name of the panicking actor.
        actor: String,
        /// Panic payload, when it was a string.
        message: String,
    },
    /// Error that does not compromise the operation of the system.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// Builds a [`Error::NoTransition`] from any debuggable state.
    pub fn no_transition<S: std::fmt::Debug>(state: &S, code: u32) -> Self {
        Error::NoTransition {
            state: format!("{:?}", state),
            code,
        }
    }
}
