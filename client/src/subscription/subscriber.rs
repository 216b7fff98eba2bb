// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event subscription
//!
//! One open subscription as seen by the client. Its mutable state (credit,
//! outstanding broker credit, buffered events, lifecycle) sits behind a
//! per-subscription mutex that is never held while a handler runs. Draining
//! is exclusive: an executor must win the claim flag first.
//!
//! A subscription opened without a handler is pollable. Executors leave it
//! alone and the user drains it with [`EventSubscription::poll`].
//!

use transport::RemoteAddress;

use crate::{
    Error,
    protocol::{
        OpenSubscriptionRequest, StartPosition, SubscribedEvent, SubscriptionType,
    },
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use std::{
    any::Any,
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// User callback receiving the events of a subscription.
pub trait EventHandler: Send {
    fn handle(&mut self, event: &SubscribedEvent) -> Result<(), Error>;
}

impl<F> EventHandler for F
where
    F: FnMut(&SubscribedEvent) -> Result<(), Error> + Send,
{
    fn handle(&mut self, event: &SubscribedEvent) -> Result<(), Error> {
        self(event)
    }
}

/// Handler shared by a subscription and its reopened successors.
pub type SharedHandler = Arc<Mutex<Box<dyn EventHandler>>>;

pub(crate) fn shared_handler<H: EventHandler + 'static>(handler: H) -> SharedHandler {
    Arc::new(Mutex::new(Box::new(handler)))
}

/// Class-specific parameters of a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionParams {
    Task {
        task_type: String,
        lock_duration: Duration,
        lock_owner: String,
    },
    Topic {
        name: String,
        start_position: StartPosition,
        force_start: bool,
    },
}

/// Everything needed to open, and reopen, a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub topic: String,
    pub partition_id: u32,
    /// Buffer capacity, also the credit requested when opening.
    pub capacity: u32,
    pub params: SubscriptionParams,
}

impl SubscriptionSpec {
    pub fn subscription_type(&self) -> SubscriptionType {
        match self.params {
            SubscriptionParams::Task { .. } => SubscriptionType::Task,
            SubscriptionParams::Topic { .. } => SubscriptionType::Topic,
        }
    }

    pub(crate) fn open_request(&self) -> OpenSubscriptionRequest {
        let subscription_type = self.subscription_type();
        let (name, lock_duration, lock_owner, start_position, force_start) =
            match &self.params {
                SubscriptionParams::Task {
                    task_type,
                    lock_duration,
                    lock_owner,
                } => (
                    task_type.clone(),
                    *lock_duration,
                    lock_owner.clone(),
                    StartPosition::default(),
                    false,
                ),
                SubscriptionParams::Topic {
                    name,
                    start_position,
                    force_start,
                } => (
                    name.clone(),
                    Duration::ZERO,
                    String::new(),
                    *start_position,
                    *force_start,
                ),
            };
        OpenSubscriptionRequest {
            subscription_type,
            topic: self.topic.clone(),
            partition_id: self.partition_id,
            name,
            credits: self.capacity,
            lock_duration,
            lock_owner,
            start_position,
            force_start,
        }
    }
}

/// Lifecycle of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Open,
    /// The connection to its broker dropped, a reopen is pending.
    Invalid,
    Closed,
}

#[derive(Debug)]
struct GuardedState {
    credit: u32,
    outstanding: u32,
    buffer: VecDeque<SubscribedEvent>,
    state: SubscriptionState,
    dropped: u64,
}

/// An open subscription.
pub struct EventSubscription {
    subscriber_key: u64,
    local_id: u64,
    remote: RemoteAddress,
    spec: SubscriptionSpec,
    lock_owner: String,
    state: Mutex<GuardedState>,
    claimed: AtomicBool,
    /// Absent for pollable subscriptions.
    handler: Option<SharedHandler>,
}

/// Exclusive drain right, released on drop.
pub struct DrainGuard<'a> {
    subscription: &'a EventSubscription,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.subscription.claimed.store(false, Ordering::Release);
    }
}

impl EventSubscription {
    /// Creates an open subscription holding `credits` granted by the broker.
    pub fn new(
        subscriber_key: u64,
        local_id: u64,
        remote: RemoteAddress,
        spec: SubscriptionSpec,
        lock_owner: String,
        credits: u32,
        handler: SharedHandler,
    ) -> Self {
        Self::with_handler(
            subscriber_key,
            local_id,
            remote,
            spec,
            lock_owner,
            credits,
            Some(handler),
        )
    }

    /// Creates an open subscription drained by [`Self::poll`] only.
    pub fn pollable(
        subscriber_key: u64,
        local_id: u64,
        remote: RemoteAddress,
        spec: SubscriptionSpec,
        lock_owner: String,
        credits: u32,
    ) -> Self {
        Self::with_handler(
            subscriber_key,
            local_id,
            remote,
            spec,
            lock_owner,
            credits,
            None,
        )
    }

    pub(crate) fn with_handler(
        subscriber_key: u64,
        local_id: u64,
        remote: RemoteAddress,
        spec: SubscriptionSpec,
        lock_owner: String,
        credits: u32,
        handler: Option<SharedHandler>,
    ) -> Self {
        let capacity = spec.capacity as usize;
        EventSubscription {
            subscriber_key,
            local_id,
            remote,
            spec,
            lock_owner,
            state: Mutex::new(GuardedState {
                credit: credits,
                outstanding: credits,
                buffer: VecDeque::with_capacity(capacity),
                state: SubscriptionState::Open,
                dropped: 0,
            }),
            claimed: AtomicBool::new(false),
            handler,
        }
    }

    pub fn subscriber_key(&self) -> u64 {
        self.subscriber_key
    }

    /// Id that survives a reopen.
    pub fn local_id(&self) -> u64 {
        self.local_id
    }

    pub fn remote(&self) -> &RemoteAddress {
        &self.remote
    }

    pub fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    pub fn subscription_type(&self) -> SubscriptionType {
        self.spec.subscription_type()
    }

    pub fn partition_id(&self) -> u32 {
        self.spec.partition_id
    }

    pub fn capacity(&self) -> u32 {
        self.spec.capacity
    }

    /// Lock owner confirmed by the broker.
    pub fn lock_owner(&self) -> &str {
        &self.lock_owner
    }

    pub(crate) fn handler(&self) -> Option<SharedHandler> {
        self.handler.clone()
    }

    pub fn is_pollable(&self) -> bool {
        self.handler.is_none()
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == SubscriptionState::Open
    }

    /// Events this client may still hand to the handler.
    pub fn credit(&self) -> u32 {
        self.state.lock().credit
    }

    /// Events the broker may still push.
    pub fn outstanding(&self) -> u32 {
        self.state.lock().outstanding
    }

    pub fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Events refused because the buffer was full or the subscription not open.
    pub fn dropped_events(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Buffers a pushed event.
    ///
    /// # Returns
    ///
    /// `false` when the event was dropped.
    pub fn push_event(&self, event: SubscribedEvent) -> bool {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.state != SubscriptionState::Open
            || state.buffer.len() >= self.spec.capacity as usize
        {
            state.dropped += 1;
            return false;
        }
        state.buffer.push_back(event);
        true
    }

    /// Room the broker could fill on top of what it already may send.
    pub fn credit_deficit(&self) -> u32 {
        let state = self.state.lock();
        let pending = state.outstanding as usize + state.buffer.len();
        (self.spec.capacity as usize).saturating_sub(pending) as u32
    }

    /// Records credits sent to the broker.
    pub fn add_credits(&self, credits: u32) {
        let mut state = self.state.lock();
        state.credit = state.credit.saturating_add(credits);
        state.outstanding = state.outstanding.saturating_add(credits);
    }

    /// Takes one credit, if any.
    pub fn try_consume_credit(&self) -> bool {
        let mut state = self.state.lock();
        if state.credit == 0 {
            return false;
        }
        state.credit -= 1;
        true
    }

    /// Claims the exclusive right to drain this subscription.
    pub fn try_claim(&self) -> Option<DrainGuard<'_>> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard { subscription: self })
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Marks the subscription invalid and drops its buffered events.
    pub(crate) fn invalidate(&self) {
        let mut state = self.state.lock();
        if state.state == SubscriptionState::Open {
            state.state = SubscriptionState::Invalid;
        }
        let discarded = state.buffer.len();
        state.dropped += discarded as u64;
        state.buffer.clear();
        debug!(
            "Subscription {} invalidated, {} buffered events discarded.",
            self.subscriber_key, discarded
        );
    }

    pub(crate) fn mark_closed(&self) {
        let mut state = self.state.lock();
        state.state = SubscriptionState::Closed;
        state.buffer.clear();
    }

    /// Takes the next deliverable event, spending one credit on it.
    fn next_event(&self) -> Option<SubscribedEvent> {
        let mut state = self.state.lock();
        if state.state != SubscriptionState::Open
            || state.buffer.is_empty()
            || state.credit == 0
        {
            return None;
        }
        state.credit -= 1;
        state.buffer.pop_front()
    }

    /// Hands up to `max_events` buffered events to the handler.
    ///
    /// Returns zero right away when another executor holds the claim or the
    /// subscription is pollable. A failing or panicking handler is logged
    /// and its event counts as delivered.
    pub fn poll_events(&self, max_events: usize) -> usize {
        let Some(handler) = self.handler.as_ref() else {
            return 0;
        };
        let Some(_guard) = self.try_claim() else {
            return 0;
        };
        let mut handler = handler.lock();
        self.drain(&mut **handler, max_events)
    }

    /// Hands the buffered events of a pollable subscription to `handler`.
    ///
    /// # Returns
    ///
    /// The number of events handled. Zero for a subscription drained by
    /// executors, or while another caller is polling it.
    pub fn poll(&self, handler: &mut dyn EventHandler) -> usize {
        if !self.is_pollable() {
            return 0;
        }
        let Some(_guard) = self.try_claim() else {
            return 0;
        };
        self.drain(handler, self.spec.capacity as usize)
    }

    fn drain(&self, handler: &mut dyn EventHandler, max_events: usize) -> usize {
        let mut handled = 0;
        while handled < max_events {
            let Some(event) = self.next_event() else {
                break;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(
                    "Handler of subscription {} failed on event {}: {}",
                    self.subscriber_key, event.position, error
                ),
                Err(payload) => warn!(
                    "Handler of subscription {} panicked on event {}: {}",
                    self.subscriber_key,
                    event.position,
                    panic_message(payload.as_ref())
                ),
            }
            handled += 1;
        }
        handled
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("subscriber_key", &self.subscriber_key)
            .field("local_id", &self.local_id)
            .field("remote", &self.remote)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}
