// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event subscriptions
//!
//! Pushed events flow through four pieces:
//!
//! 1. the collector, polling inbound frames and decoding events,
//! 2. an [`EventAcquisition`] per class, buffering each event in its
//!    [`EventSubscription`] and keeping the broker supplied with credits,
//! 3. the [`EventSubscriptions`] registry shared by all of them,
//! 4. [`SubscriptionExecutor`]s invoking the handlers.
//!
//! [`SubscriptionManager`] wires them together.
//!

mod acquisition;
mod builder;
mod collector;
mod executor;
mod manager;
mod registry;
mod subscriber;

pub use acquisition::{
    AcquisitionHandle, EventAcquisition, OpenFuture, OpenState,
    SubscriptionHandle, refill_batch,
};
pub use builder::{
    PollableTaskSubscriptionBuilder, PollableTopicSubscriptionBuilder,
    TaskSubscriptionBuilder, TopicSubscriptionBuilder,
};
pub use executor::SubscriptionExecutor;
pub use manager::SubscriptionManager;
pub use registry::{EventSubscriptions, SubscriptionsFor};
pub(crate) use subscriber::shared_handler;
pub use subscriber::{
    DrainGuard, EventHandler, EventSubscription, SharedHandler,
    SubscriptionParams, SubscriptionSpec, SubscriptionState,
};
