// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Client configuration
//!

use actor::IdleStrategyConfig;

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Settings of a [`crate::SubscriptionManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Runner threads executing subscription handlers.
    pub execution_threads: usize,
    /// Default buffer capacity of topic subscriptions.
    pub topic_subscription_prefetch_capacity: u32,
    /// Default buffer capacity of task subscriptions.
    pub task_fetch_size: u32,
    /// Deadline of every request, and the longest reopen backoff.
    pub request_timeout_ms: u64,
    /// Events handed to a handler per subscription per slice.
    pub executor_batch_size: usize,
    /// Subscriptions visited by one executor slice.
    pub max_subscriptions_per_slice: usize,
    /// Default lock owner of task subscriptions.
    pub default_lock_owner: String,
    /// Default lock duration of task subscriptions.
    pub default_lock_time_ms: u64,
    /// Idle strategy of both schedulers.
    pub idle_strategy: IdleStrategyConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            execution_threads: 2,
            topic_subscription_prefetch_capacity: 32,
            task_fetch_size: 32,
            request_timeout_ms: 15_000,
            executor_batch_size: 32,
            max_subscriptions_per_slice: 16,
            default_lock_owner: "default".to_owned(),
            default_lock_time_ms: 5 * 60 * 1000,
            idle_strategy: IdleStrategyConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn default_lock_time(&self) -> Duration {
        Duration::from_millis(self.default_lock_time_ms)
    }
}
