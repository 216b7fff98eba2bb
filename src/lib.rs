// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Concurrency and flow-control core of a task broker client.
//! Bundles the cooperative actor runtime, the transport seams and the
//! subscription and topology machinery built on top of them.

pub use actor::{
    Actor, ActorPriority, ActorReference, ActorScheduler, Clock,
    Error as ActorError, FnActor, IdleStrategy, IdleStrategyConfig,
    ManualClock, MachineContext, State, StateContext, StateMachine,
    SystemClock, TRANSITION_DEFAULT,
};

pub use transport::{
    ClientOutput, ClientRequest, Error as TransportError, InboundMessages,
    MemoryOutput, RemoteAddress, RequestError, TransportListener, ring_buffer,
};

pub use client::{
    ClientConfig, Error as ClientError, EventHandler, OpenFuture,
    SharedTopology, StartPosition, SubscribedEvent, SubscriptionHandle,
    SubscriptionManager, SubscriptionType, TopologyHandle, TopologyManager,
    TopologySnapshot, TopologyView,
};
