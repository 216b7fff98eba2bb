// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Cooperative actor runtime
//!
//! This crate is the execution core of the broker and its clients. All protocol
//! logic runs as cooperative actors on a small, fixed pool of threads instead of
//! one thread (or one parked stack) per in-flight request.
//!
//! ## Overview
//!
//! - [`Actor`]: a unit of work exposing a single non-blocking `do_work` call
//!   that returns how much work it did.
//! - [`ActorScheduler`]: owns N runner threads. Every runner loops over its
//!   actors round-robin, gives each a bounded number of slices per pass and
//!   consults its [`IdleStrategy`] when a whole pass did nothing.
//! - [`StateMachine`]: a generic finite state machine with an explicit
//!   transition table. It turns a long asynchronous protocol (request, await
//!   response or timeout, go idle) into a series of short slices and is itself
//!   an [`Actor`].
//! - [`Clock`]: the time source used for request deadlines, so tests can move
//!   time by hand.
//!
//! ## Failure handling
//!
//! An error returned from a slice, or a panic raised inside one, is caught by
//! the runner and handed to the scheduler's error handler. The actor stays
//! scheduled and is retried on the next pass: a persistently failing actor costs
//! throughput but never takes the process down.
//!
//! ## Getting Started
//!
//! ```ignore
//! use actor::{ActorScheduler, FnActor, IdleStrategyConfig};
//!
//! let scheduler = ActorScheduler::builder()
//!     .name("broker")
//!     .thread_count(2)
//!     .idle_strategy(IdleStrategyConfig::default())
//!     .build()?;
//!
//! let reference = scheduler.schedule(FnActor::new("ticker", || Ok(0)))?;
//!
//! reference.close();
//! scheduler.close();
//! ```
//!

mod actor;
mod clock;
mod error;
mod idle;
mod runner;
mod scheduler;
mod state;

pub use actor::{Actor, ActorPriority, FnActor};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::Error;
pub use idle::{
    BackoffIdleStrategy, BusySpinIdleStrategy, IdleLevel, IdleStrategy,
    IdleStrategyConfig,
};
pub use runner::{ErrorHandler, default_error_handler};
pub use scheduler::{
    ActorReference, ActorScheduler, ActorSchedulerBuilder,
    DEFAULT_BASE_ITERATIONS_PER_ACTOR, SchedulerConfig, resolve_thread_count,
};
pub use state::{
    Idle, MachineContext, State, StateContext, StateId, StateMachine,
    StateMachineBuilder, TRANSITION_DEFAULT, TransitionCode, TransitionFrom,
    TransitionTake, WaitState,
};
