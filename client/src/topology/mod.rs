// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Cluster topology
//!
//! Which broker leads which partition. The [`TopologyManager`] actor
//! refreshes it through a [`TopologyController`] state machine and publishes
//! each result into a [`SharedTopology`], which everyone else reads through
//! the [`TopologyView`] trait.
//!

mod controller;
mod manager;
mod snapshot;

pub use controller::{TopologyCallback, TopologyController, TopologyState};
pub use manager::{TopologyHandle, TopologyManager, TopologyRefresh};
pub use snapshot::{PartitionLeader, SharedTopology, TopologySnapshot, TopologyView};
