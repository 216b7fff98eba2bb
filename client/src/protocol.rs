// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Client protocol messages
//!
//! Bodies of the messages exchanged with brokers. Requests travel as a
//! [`ControlMessage`] under [`CONTROL_MESSAGE_REQUEST_TEMPLATE`]; responses
//! and pushed events use their own templates.
//!

use transport::{CONTROL_MESSAGE_REQUEST_TEMPLATE, Error, encode_message};

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Class of a subscription. Each class has its own acquisition and registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionType {
    Task,
    Topic,
}

/// Where a topic subscription starts reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartPosition {
    /// Oldest event still available.
    Head,
    /// Only events written after the subscription opened.
    #[default]
    Tail,
    /// Events after this position.
    Position(u64),
}

/// Parameters of an open-subscription request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSubscriptionRequest {
    pub subscription_type: SubscriptionType,
    pub topic: String,
    pub partition_id: u32,
    /// Task type for task subscriptions, subscription name for topic ones.
    pub name: String,
    pub credits: u32,
    pub lock_duration: Duration,
    pub lock_owner: String,
    pub start_position: StartPosition,
    pub force_start: bool,
}

/// Response to an [`OpenSubscriptionRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSubscriptionResponse {
    pub subscriber_key: u64,
    /// Credits granted by the broker.
    pub credits: u32,
    pub lock_owner: String,
    pub partition_id: u32,
}

/// Fire-and-forget credit top-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditsMessage {
    pub subscriber_key: u64,
    pub subscription_type: SubscriptionType,
    pub partition_id: u32,
    pub credits: u32,
}

/// Fire-and-forget subscription close.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSubscriptionMessage {
    pub subscriber_key: u64,
    pub subscription_type: SubscriptionType,
    pub partition_id: u32,
}

/// Requests and messages sent by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    RequestTopology,
    OpenSubscription(OpenSubscriptionRequest),
    IncreaseCredits(CreditsMessage),
    CloseSubscription(CloseSubscriptionMessage),
}

impl ControlMessage {
    /// Header plus body, ready for a [`transport::ClientOutput`].
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        encode_message(CONTROL_MESSAGE_REQUEST_TEMPLATE, self)
    }
}

/// Event pushed by a broker to a subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedEvent {
    pub subscriber_key: u64,
    pub subscription_type: SubscriptionType,
    pub partition_id: u32,
    pub position: u64,
    pub key: u64,
    pub payload: Vec<u8>,
}
