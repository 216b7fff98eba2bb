// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Broker client core
//!
//! Subscription and topology handling of a broker client, written as actors
//! on top of the [`actor`] runtime and the [`transport`] seams.
//!
//! ## Overview
//!
//! - [`SubscriptionManager`]: opens task and topic subscriptions, delivers
//!   pushed events to their handlers and reopens subscriptions when a
//!   connection is lost. Pollable subscriptions skip the handlers and are
//!   drained by the caller.
//! - [`TopologyManager`]: keeps the partition leaders current.
//! - [`ClientConfig`]: buffer sizes, timeouts and thread counts.
//!
//! ## Getting Started
//!
//! ```ignore
//! use client::{ClientConfig, SharedTopology, SubscriptionManager};
//!
//! let manager = SubscriptionManager::new(
//!     ClientConfig::default(),
//!     output,
//!     Box::new(inbound),
//!     Arc::new(SharedTopology::default()),
//!     Arc::new(SystemClock),
//! )?;
//! manager.start()?;
//!
//! let subscription = manager
//!     .new_topic_subscription("orders")
//!     .name("audit")
//!     .start_at_head()
//!     .handler(|event: &SubscribedEvent| {
//!         println!("{}", event.position);
//!         Ok(())
//!     })
//!     .open()?
//!     .wait()?;
//!
//! subscription.close();
//! manager.close();
//! ```
//!

mod config;
mod error;
pub mod protocol;
pub mod subscription;
pub mod topology;

pub use config::ClientConfig;
pub use error::Error;
pub use protocol::{
    CloseSubscriptionMessage, ControlMessage, CreditsMessage,
    OpenSubscriptionRequest, OpenSubscriptionResponse, StartPosition,
    SubscribedEvent, SubscriptionType,
};
pub use subscription::{
    AcquisitionHandle, EventAcquisition, EventHandler, EventSubscription,
    EventSubscriptions, OpenFuture, PollableTaskSubscriptionBuilder,
    PollableTopicSubscriptionBuilder, SubscriptionExecutor, SubscriptionHandle,
    SubscriptionManager, SubscriptionState, TaskSubscriptionBuilder,
    TopicSubscriptionBuilder,
};
pub use topology::{
    SharedTopology, TopologyHandle, TopologyManager, TopologySnapshot,
    TopologyView,
};
