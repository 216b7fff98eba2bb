// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Subscription executor
//!
//! Actor handing buffered events to subscription handlers. Several executors
//! share one registry; the per-subscription claim flag makes sure only one of
//! them drains a given subscription at a time.
//!

use actor::{Actor, Error as ActorError};

use crate::subscription::EventSubscriptions;

use std::sync::Arc;

/// Drains the subscriptions of one registry.
pub struct SubscriptionExecutor {
    name: String,
    subscriptions: Arc<EventSubscriptions>,
    cursor: usize,
    max_subscriptions_per_slice: usize,
    batch_size: usize,
}

impl SubscriptionExecutor {
    /// # Arguments
    ///
    /// * `max_subscriptions_per_slice` - Subscriptions visited by one slice.
    /// * `batch_size` - Events handled per subscription per slice.
    pub fn new(
        name: &str,
        subscriptions: Arc<EventSubscriptions>,
        max_subscriptions_per_slice: usize,
        batch_size: usize,
    ) -> Self {
        SubscriptionExecutor {
            name: name.to_owned(),
            subscriptions,
            cursor: 0,
            max_subscriptions_per_slice: max_subscriptions_per_slice.max(1),
            batch_size: batch_size.max(1),
        }
    }
}

impl Actor for SubscriptionExecutor {
    fn do_work(&mut self) -> Result<usize, ActorError> {
        let snapshot = self.subscriptions.snapshot();
        if snapshot.is_empty() {
            return Ok(0);
        }
        let count = snapshot.len();
        let visits = count.min(self.max_subscriptions_per_slice);
        let start = self.cursor % count;

        let mut handled = 0;
        for offset in 0..visits {
            handled += snapshot[(start + offset) % count].poll_events(self.batch_size);
        }
        self.cursor = (start + visits) % count;
        Ok(handled)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
