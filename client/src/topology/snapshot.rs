// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Topology snapshot
//!

use transport::RemoteAddress;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

/// Leader of one partition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLeader {
    pub partition_id: u32,
    pub leader: RemoteAddress,
}

/// Topic name to partition leaders, as reported by a broker.
///
/// This is also the body of a topology response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    topics: BTreeMap<String, Vec<PartitionLeader>>,
}

impl TopologySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the leader of a partition, keeping partitions ordered by id.
    pub fn with_leader(
        mut self,
        topic: &str,
        partition_id: u32,
        leader: RemoteAddress,
    ) -> Self {
        let partitions = self.topics.entry(topic.to_owned()).or_default();
        match partitions
            .binary_search_by_key(&partition_id, |partition| partition.partition_id)
        {
            Ok(index) => partitions[index].leader = leader,
            Err(index) => partitions.insert(
                index,
                PartitionLeader {
                    partition_id,
                    leader,
                },
            ),
        }
        self
    }

    pub fn partitions(&self, topic: &str) -> &[PartitionLeader] {
        self.topics.get(topic).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn leader(&self, topic: &str, partition_id: u32) -> Option<&RemoteAddress> {
        self.partitions(topic)
            .iter()
            .find(|partition| partition.partition_id == partition_id)
            .map(|partition| &partition.leader)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// Every broker leading at least one partition.
    pub fn brokers(&self) -> BTreeSet<&RemoteAddress> {
        self.topics
            .values()
            .flatten()
            .map(|partition| &partition.leader)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Read-only access to the current topology.
pub trait TopologyView: Send + Sync {
    fn leader(&self, topic: &str, partition_id: u32) -> Option<RemoteAddress>;

    fn snapshot(&self) -> Arc<TopologySnapshot>;
}

/// Topology published by a refresher and read lock-free by everyone else.
#[derive(Debug, Clone)]
pub struct SharedTopology {
    current: Arc<ArcSwap<TopologySnapshot>>,
}

impl SharedTopology {
    pub fn new(initial: TopologySnapshot) -> Self {
        SharedTopology {
            current: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// Replaces the published snapshot.
    pub fn update(&self, snapshot: TopologySnapshot) -> Arc<TopologySnapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(snapshot.clone());
        snapshot
    }
}

impl Default for SharedTopology {
    fn default() -> Self {
        Self::new(TopologySnapshot::default())
    }
}

impl TopologyView for SharedTopology {
    fn leader(&self, topic: &str, partition_id: u32) -> Option<RemoteAddress> {
        self.current.load().leader(topic, partition_id).cloned()
    }

    fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(port: u16) -> RemoteAddress {
        RemoteAddress::new("broker", port)
    }

    #[test]
    fn test_partitions_stay_ordered() {
        let snapshot = TopologySnapshot::new()
            .with_leader("orders", 2, broker(2))
            .with_leader("orders", 0, broker(0))
            .with_leader("orders", 1, broker(1))
            .with_leader("orders", 2, broker(3));

        let ids: Vec<u32> = snapshot
            .partitions("orders")
            .iter()
            .map(|partition| partition.partition_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(snapshot.leader("orders", 2), Some(&broker(3)));
        assert_eq!(snapshot.leader("orders", 5), None);
        assert!(snapshot.partitions("unknown").is_empty());
        assert_eq!(snapshot.brokers().len(), 3);
    }

    #[test]
    fn test_shared_topology_publishes() {
        let shared = SharedTopology::default();
        let reader = shared.clone();
        assert!(reader.snapshot().is_empty());
        assert_eq!(reader.leader("orders", 0), None);

        shared.update(TopologySnapshot::new().with_leader("orders", 0, broker(1)));
        assert_eq!(reader.leader("orders", 0), Some(broker(1)));
        assert_eq!(reader.snapshot().topics().collect::<Vec<_>>(), vec!["orders"]);
    }
}
