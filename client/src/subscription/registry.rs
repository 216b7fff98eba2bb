// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Subscription registry
//!
//! Subscriber key to subscription. Writes (open, close, reopen) go through a
//! short-held map lock and republish a sorted snapshot; readers (executors,
//! the event collector) only ever load the snapshot.
//!

use transport::RemoteAddress;

use crate::subscription::EventSubscription;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use std::{collections::HashMap, sync::Arc};

type Snapshot = Arc<Vec<Arc<EventSubscription>>>;

/// Subscriptions of one class.
pub struct EventSubscriptions {
    entries: Mutex<HashMap<u64, Arc<EventSubscription>>>,
    snapshot: ArcSwap<Vec<Arc<EventSubscription>>>,
}

impl Default for EventSubscriptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSubscriptions {
    pub fn new() -> Self {
        EventSubscriptions {
            entries: Mutex::new(HashMap::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    fn publish(&self, entries: &HashMap<u64, Arc<EventSubscription>>) {
        let mut snapshot: Vec<Arc<EventSubscription>> =
            entries.values().cloned().collect();
        snapshot.sort_by_key(|subscription| subscription.subscriber_key());
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Registers a subscription, returning the one it replaced.
    pub fn add(
        &self,
        subscription: Arc<EventSubscription>,
    ) -> Option<Arc<EventSubscription>> {
        let mut entries = self.entries.lock();
        let previous =
            entries.insert(subscription.subscriber_key(), subscription);
        self.publish(&entries);
        previous
    }

    /// Unregisters a subscription.
    ///
    /// A drainer still holding it finishes its current handler call. Callers
    /// mark it closed or invalid so later accesses are no-ops.
    pub fn remove(&self, subscriber_key: u64) -> Option<Arc<EventSubscription>> {
        let mut entries = self.entries.lock();
        let removed = entries.remove(&subscriber_key);
        if removed.is_some() {
            self.publish(&entries);
        }
        removed
    }

    /// Closes and unregisters every subscription.
    pub fn remove_all(&self) -> Vec<Arc<EventSubscription>> {
        let mut entries = self.entries.lock();
        let removed: Vec<_> = entries.drain().map(|(_, subscription)| subscription).collect();
        self.publish(&entries);
        for subscription in &removed {
            subscription.mark_closed();
        }
        debug!("Removed all {} subscriptions.", removed.len());
        removed
    }

    pub fn get(&self, subscriber_key: u64) -> Option<Arc<EventSubscription>> {
        let snapshot = self.snapshot.load();
        snapshot
            .binary_search_by_key(&subscriber_key, |subscription| {
                subscription.subscriber_key()
            })
            .ok()
            .map(|index| snapshot[index].clone())
    }

    /// Finds the current subscription with a local id.
    pub fn find_local(&self, local_id: u64) -> Option<Arc<EventSubscription>> {
        self.snapshot
            .load()
            .iter()
            .find(|subscription| subscription.local_id() == local_id)
            .cloned()
    }

    /// Subscriptions ordered by subscriber key, as of now.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.load_full()
    }

    /// Subscriptions opened on `remote`, filtered lazily over a snapshot.
    pub fn subscriptions_for(&self, remote: &RemoteAddress) -> SubscriptionsFor {
        SubscriptionsFor {
            snapshot: self.snapshot(),
            remote: remote.clone(),
            index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator returned by [`EventSubscriptions::subscriptions_for`].
pub struct SubscriptionsFor {
    snapshot: Snapshot,
    remote: RemoteAddress,
    index: usize,
}

impl Iterator for SubscriptionsFor {
    type Item = Arc<EventSubscription>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(subscription) = self.snapshot.get(self.index) {
            self.index += 1;
            if subscription.remote() == &self.remote {
                return Some(subscription.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::subscription::{
        SubscriptionState, shared_handler,
        subscriber::tests::{event, topic_spec},
    };
    use crate::protocol::SubscribedEvent;

    fn subscription(key: u64, port: u16) -> Arc<EventSubscription> {
        Arc::new(EventSubscription::new(
            key,
            key * 100,
            RemoteAddress::new("broker", port),
            topic_spec(8),
            String::new(),
            8,
            shared_handler(|_: &SubscribedEvent| Ok(())),
        ))
    }

    #[test]
    fn test_add_get_remove() {
        let registry = EventSubscriptions::new();
        assert!(registry.is_empty());
        assert!(registry.add(subscription(3, 1)).is_none());
        assert!(registry.add(subscription(1, 1)).is_none());
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.get(3).unwrap().local_id(), 300);
        assert!(registry.get(2).is_none());
        assert_eq!(registry.find_local(100).unwrap().subscriber_key(), 1);

        let keys: Vec<u64> = registry
            .snapshot()
            .iter()
            .map(|subscription| subscription.subscriber_key())
            .collect();
        assert_eq!(keys, vec![1, 3]);

        assert!(registry.remove(3).is_some());
        assert!(registry.remove(3).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_stable() {
        let registry = EventSubscriptions::new();
        registry.add(subscription(1, 1));
        let snapshot = registry.snapshot();
        registry.add(subscription(2, 1));
        registry.remove(1);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].subscriber_key(), 1);
    }

    #[test]
    fn test_subscriptions_for_remote() {
        let registry = EventSubscriptions::new();
        registry.add(subscription(1, 1));
        registry.add(subscription(2, 2));
        registry.add(subscription(3, 1));

        let keys: Vec<u64> = registry
            .subscriptions_for(&RemoteAddress::new("broker", 1))
            .map(|subscription| subscription.subscriber_key())
            .collect();
        assert_eq!(keys, vec![1, 3]);
        assert_eq!(
            registry
                .subscriptions_for(&RemoteAddress::new("broker", 9))
                .count(),
            0
        );
    }

    #[test]
    fn test_remove_all_closes() {
        let registry = EventSubscriptions::new();
        let first = subscription(1, 1);
        registry.add(first.clone());
        registry.add(subscription(2, 1));
        first.push_event(event(1, 1));

        assert_eq!(registry.remove_all().len(), 2);
        assert!(registry.is_empty());
        assert_eq!(first.state(), SubscriptionState::Closed);
        assert_eq!(first.buffered(), 0);
    }

    #[test]
    fn test_removed_while_draining() {
        let registry = EventSubscriptions::new();
        let drained = subscription(1, 1);
        registry.add(drained.clone());
        drained.push_event(event(1, 1));

        let guard = drained.try_claim().unwrap();
        let removed = registry.remove(1).unwrap();
        removed.mark_closed();
        drop(guard);

        assert_eq!(drained.poll_events(10), 0);
        assert!(!drained.push_event(event(1, 2)));
    }
}
