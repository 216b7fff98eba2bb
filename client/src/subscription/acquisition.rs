// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event acquisition
//!
//! One actor per subscription class owns the broker-facing lifecycle of its
//! subscriptions:
//!
//! - opening them, each open request being a small state machine
//!   (`Request -> Await -> Done`, with a `Backoff` detour for reopens and
//!   for a user open waiting for a topology refresh),
//! - keeping brokers supplied with credits as handlers consume events,
//! - closing them,
//! - reopening every subscription of a broker whose connection dropped.
//!
//! Everything arrives through an [`AcquisitionHandle`]. Pushed events are the
//! exception: the collector hands them over directly with
//! [`AcquisitionHandle::on_event`], which only touches the registry.
//!

use actor::{
    Actor, Clock, Error as ActorError, Idle, MachineContext, State,
    StateContext, StateMachine, TRANSITION_DEFAULT, TransitionCode,
};
use transport::{
    ClientOutput, ClientRequest, OPEN_SUBSCRIPTION_RESPONSE_TEMPLATE,
    RemoteAddress, RequestError, decode_response,
};

use crate::{
    Error,
    protocol::{
        CloseSubscriptionMessage, ControlMessage, CreditsMessage,
        OpenSubscriptionResponse, SubscribedEvent, SubscriptionType,
    },
    subscription::{
        EventHandler, EventSubscription, EventSubscriptions, SharedHandler,
        SubscriptionSpec,
    },
    topology::{TopologyHandle, TopologyRefresh, TopologyView},
};

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
    time::{Duration, Instant},
};

const TRANSITION_RETRY: TransitionCode = 1;
const TRANSITION_FAILED: TransitionCode = 2;

/// First reopen delay, doubled on every failure up to the request timeout.
const INITIAL_REOPEN_INTERVAL: Duration = Duration::from_millis(100);

/// Credit deficit worth a top-up message for a buffer of `capacity`.
pub fn refill_batch(capacity: u32) -> u32 {
    ((capacity as u64 * 3).div_ceil(10)).max(1) as u32
}

type OpenReply = oneshot::Sender<Result<SubscriptionHandle, Error>>;

enum AcquisitionCommand {
    Open {
        local_id: u64,
        spec: SubscriptionSpec,
        handler: Option<SharedHandler>,
        reply: OpenReply,
    },
    Close {
        local_id: u64,
    },
    Reopen {
        remote: RemoteAddress,
    },
}

/// States of one open request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenState {
    Request,
    Await,
    Backoff,
    Done,
}

struct OpenContext {
    local_id: u64,
    spec: SubscriptionSpec,
    /// `None` opens a pollable subscription.
    handler: Option<SharedHandler>,
    /// Reopens retry forever instead of failing.
    reopen: bool,
    output: Arc<dyn ClientOutput>,
    topology: Arc<dyn TopologyView>,
    refresher: Option<TopologyHandle>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    remote: Option<RemoteAddress>,
    request: Option<Box<dyn ClientRequest>>,
    deadline: Option<Instant>,
    backoff: ExponentialBackoff,
    retry_at: Option<Instant>,
    /// Refresh a user open waits for after finding no leader.
    refresh: Option<TopologyRefresh>,
    refreshed: bool,
    outcome: Option<Result<OpenSubscriptionResponse, RequestError>>,
}

impl OpenContext {
    fn close_request(&mut self) {
        if let Some(mut request) = self.request.take() {
            request.close();
        }
        self.deadline = None;
    }

    /// Records a failed attempt and returns the transition to take.
    fn fail(&mut self, error: RequestError) -> TransitionCode {
        self.close_request();
        if let (RequestError::NoLeader { .. }, Some(refresher)) =
            (&error, &self.refresher)
        {
            if !self.reopen && !self.refreshed {
                // One more attempt once the topology was refreshed.
                debug!(
                    "No leader for subscription {} yet, waiting for a topology refresh.",
                    self.local_id
                );
                self.refresh = Some(refresher.refresh());
                self.refreshed = true;
                self.retry_at = Some(self.clock.now() + self.request_timeout);
                return TRANSITION_RETRY;
            }
            refresher.request_refresh();
        }
        if !self.reopen {
            self.outcome = Some(Err(error));
            return TRANSITION_FAILED;
        }
        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.request_timeout)
            .min(self.request_timeout);
        warn!(
            "Reopening subscription {} on {} failed: {}. Retrying in {:?}.",
            self.local_id, self.spec.topic, error, delay
        );
        self.retry_at = Some(self.clock.now() + delay);
        TRANSITION_RETRY
    }
}

impl MachineContext for OpenContext {
    fn reset(&mut self) {
        self.close_request();
        self.remote = None;
        self.retry_at = None;
        self.refresh = None;
        self.refreshed = false;
        self.outcome = None;
        self.backoff.reset();
    }
}

struct RequestOpen;

impl State<OpenContext> for RequestOpen {
    fn work(
        &mut self,
        ctx: &mut StateContext<OpenContext>,
    ) -> Result<usize, ActorError> {
        let Some(remote) = ctx.topology.leader(&ctx.spec.topic, ctx.spec.partition_id)
        else {
            let error = RequestError::NoLeader {
                topic: ctx.spec.topic.clone(),
                partition: ctx.spec.partition_id,
            };
            let code = ctx.fail(error);
            ctx.take(code);
            return Ok(1);
        };

        let payload =
            match ControlMessage::OpenSubscription(ctx.spec.open_request()).encode() {
                Ok(payload) => payload,
                Err(e) => {
                    let code = ctx.fail(RequestError::Transport(format!(
                        "Unable to encode open request: {}",
                        e
                    )));
                    ctx.take(code);
                    return Ok(1);
                }
            };

        match ctx.output.send_request(&remote, payload) {
            Some(request) => {
                let deadline = ctx.clock.now() + ctx.request_timeout;
                ctx.request = Some(request);
                ctx.deadline = Some(deadline);
                ctx.remote = Some(remote);
                ctx.take(TRANSITION_DEFAULT);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

struct AwaitOpen;

impl State<OpenContext> for AwaitOpen {
    fn work(
        &mut self,
        ctx: &mut StateContext<OpenContext>,
    ) -> Result<usize, ActorError> {
        let now = ctx.clock.now();
        let expired = ctx.deadline.is_some_and(|deadline| now >= deadline);
        let timeout = ctx.request_timeout;

        let outcome = match ctx.request.as_mut() {
            Some(request) if request.is_done() => {
                request.take_response().and_then(|response| {
                    decode_response::<OpenSubscriptionResponse>(
                        &response,
                        OPEN_SUBSCRIPTION_RESPONSE_TEMPLATE,
                    )
                })
            }
            Some(_) if expired => Err(RequestError::Timeout(timeout)),
            Some(_) => return Ok(0),
            None => Err(RequestError::Transport(
                "Open request vanished.".to_owned(),
            )),
        };

        let code = match outcome {
            Ok(response) => {
                ctx.close_request();
                ctx.outcome = Some(Ok(response));
                TRANSITION_DEFAULT
            }
            Err(error) => ctx.fail(error),
        };
        ctx.take(code);
        Ok(1)
    }
}

struct BackoffOpen;

impl State<OpenContext> for BackoffOpen {
    fn work(
        &mut self,
        ctx: &mut StateContext<OpenContext>,
    ) -> Result<usize, ActorError> {
        let now = ctx.clock.now();
        let due = ctx.retry_at.map_or(true, |retry_at| now >= retry_at);
        let refreshed = match ctx.refresh.as_mut() {
            Some(refresh) => match refresh.try_result() {
                Some(Ok(_)) => true,
                Some(Err(e)) => {
                    debug!(
                        "Topology refresh for subscription {} failed: {}",
                        ctx.local_id, e
                    );
                    true
                }
                None => false,
            },
            None => false,
        };
        if !due && !refreshed {
            return Ok(0);
        }
        ctx.refresh = None;
        ctx.retry_at = None;
        ctx.take(TRANSITION_DEFAULT);
        Ok(1)
    }
}

enum Origin {
    User(Option<OpenReply>),
    Reopen,
}

struct OpenRequest {
    machine: StateMachine<OpenState, OpenContext>,
    origin: Origin,
}

impl OpenRequest {
    fn local_id(&self) -> u64 {
        self.machine.context().local_id
    }

    fn reply(&mut self, result: Result<SubscriptionHandle, Error>) {
        if let Origin::User(reply) = &mut self.origin {
            if let Some(reply) = reply.take() {
                let _ = reply.send(result);
            }
        }
    }
}

/// Cloneable entry point of an [`EventAcquisition`].
#[derive(Clone)]
pub struct AcquisitionHandle {
    subscription_type: SubscriptionType,
    sender: mpsc::UnboundedSender<AcquisitionCommand>,
    subscriptions: Arc<EventSubscriptions>,
    next_local_id: Arc<AtomicU64>,
}

impl fmt::Debug for AcquisitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionHandle")
            .field("subscription_type", &self.subscription_type)
            .finish_non_exhaustive()
    }
}

impl AcquisitionHandle {
    pub fn subscription_type(&self) -> SubscriptionType {
        self.subscription_type
    }

    pub fn subscriptions(&self) -> &Arc<EventSubscriptions> {
        &self.subscriptions
    }

    /// Queues an open request.
    ///
    /// The returned future resolves once the broker answered. A failed open
    /// is reported, never retried, except that an open finding no leader
    /// waits for one topology refresh first when a refresher is wired.
    pub fn open(&self, spec: SubscriptionSpec, handler: SharedHandler) -> OpenFuture {
        self.queue_open(spec, Some(handler))
    }

    /// Queues the open of a subscription drained through
    /// [`SubscriptionHandle::poll`] instead of by executors.
    pub fn open_pollable(&self, spec: SubscriptionSpec) -> OpenFuture {
        self.queue_open(spec, None)
    }

    fn queue_open(
        &self,
        spec: SubscriptionSpec,
        handler: Option<SharedHandler>,
    ) -> OpenFuture {
        let (reply, receiver) = oneshot::channel();
        if spec.subscription_type() != self.subscription_type {
            let _ = reply.send(Err(Error::InvalidArgument(format!(
                "A {:?} subscription can't be opened by the {:?} acquisition.",
                spec.subscription_type(),
                self.subscription_type
            ))));
            return OpenFuture { receiver };
        }
        let local_id = self.next_local_id.fetch_add(1, Ordering::Relaxed);
        // If the acquisition is gone the reply is dropped and the future
        // resolves to `Closed`.
        let _ = self.sender.send(AcquisitionCommand::Open {
            local_id,
            spec,
            handler,
            reply,
        });
        OpenFuture { receiver }
    }

    /// Queues the close of a subscription or of its pending (re)open.
    pub fn close(&self, local_id: u64) -> bool {
        self.sender
            .send(AcquisitionCommand::Close { local_id })
            .is_ok()
    }

    /// Queues the reopen of every subscription opened on `remote`.
    pub fn reopen_subscriptions_for(&self, remote: &RemoteAddress) -> bool {
        self.sender
            .send(AcquisitionCommand::Reopen {
                remote: remote.clone(),
            })
            .is_ok()
    }

    /// Buffers a pushed event in its subscription.
    ///
    /// # Returns
    ///
    /// `false` when the event was dropped.
    pub fn on_event(&self, event: SubscribedEvent) -> bool {
        match self.subscriptions.get(event.subscriber_key) {
            Some(subscription) => subscription.push_event(event),
            None => {
                debug!(
                    "Dropping event {} for unknown subscriber {}.",
                    event.position, event.subscriber_key
                );
                false
            }
        }
    }
}

/// Pending outcome of [`AcquisitionHandle::open`].
pub struct OpenFuture {
    receiver: oneshot::Receiver<Result<SubscriptionHandle, Error>>,
}

impl OpenFuture {
    /// Blocks until the open completes. Not for use in async code.
    pub fn wait(self) -> Result<SubscriptionHandle, Error> {
        self.receiver.blocking_recv().unwrap_or(Err(Error::Closed))
    }

    /// The outcome, if already known.
    pub fn try_result(&mut self) -> Option<Result<SubscriptionHandle, Error>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Closed)),
        }
    }
}

impl Future for OpenFuture {
    type Output = Result<SubscriptionHandle, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::Closed)))
    }
}

/// User-side handle of an opened subscription. Follows it across reopens.
#[derive(Clone)]
pub struct SubscriptionHandle {
    local_id: u64,
    acquisition: AcquisitionHandle,
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("local_id", &self.local_id)
            .field("subscription_type", &self.acquisition.subscription_type)
            .finish()
    }
}

impl SubscriptionHandle {
    pub fn local_id(&self) -> u64 {
        self.local_id
    }

    pub fn subscription_type(&self) -> SubscriptionType {
        self.acquisition.subscription_type
    }

    /// The current incarnation, absent while reopening or once closed.
    pub fn subscription(&self) -> Option<Arc<EventSubscription>> {
        self.acquisition.subscriptions.find_local(self.local_id)
    }

    pub fn is_open(&self) -> bool {
        self.subscription()
            .is_some_and(|subscription| subscription.is_open())
    }

    /// Drains a pollable subscription into `handler`.
    ///
    /// # Returns
    ///
    /// The number of events handled. Zero while the subscription is
    /// reopening, or when executors drain it.
    pub fn poll(&self, handler: &mut dyn EventHandler) -> usize {
        self.subscription()
            .map_or(0, |subscription| subscription.poll(handler))
    }

    /// Queues the close of the subscription.
    pub fn close(&self) -> bool {
        self.acquisition.close(self.local_id)
    }
}

/// Actor acquiring events for one subscription class.
pub struct EventAcquisition {
    name: String,
    handle: AcquisitionHandle,
    commands: mpsc::UnboundedReceiver<AcquisitionCommand>,
    subscriptions: Arc<EventSubscriptions>,
    output: Arc<dyn ClientOutput>,
    topology: Arc<dyn TopologyView>,
    refresher: Option<TopologyHandle>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    pending: Vec<OpenRequest>,
}

impl EventAcquisition {
    /// Creates the acquisition of `subscription_type` and its handle.
    ///
    /// # Arguments
    ///
    /// * `subscriptions` - Registry of this class, shared with executors.
    /// * `output` - Where requests and messages are sent.
    /// * `topology` - Resolves the leader of a subscription's partition.
    /// * `clock` - Time source for deadlines and reopen backoff.
    /// * `request_timeout` - Deadline of an open request.
    pub fn new(
        subscription_type: SubscriptionType,
        subscriptions: Arc<EventSubscriptions>,
        output: Arc<dyn ClientOutput>,
        topology: Arc<dyn TopologyView>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> (Self, AcquisitionHandle) {
        let (sender, commands) = mpsc::unbounded_channel();
        let handle = AcquisitionHandle {
            subscription_type,
            sender,
            subscriptions: subscriptions.clone(),
            next_local_id: Arc::new(AtomicU64::new(1)),
        };
        let name = match subscription_type {
            SubscriptionType::Task => "task-acquisition",
            SubscriptionType::Topic => "topic-acquisition",
        };
        (
            EventAcquisition {
                name: name.to_owned(),
                handle: handle.clone(),
                commands,
                subscriptions,
                output,
                topology,
                refresher: None,
                clock,
                request_timeout,
                pending: Vec::new(),
            },
            handle,
        )
    }

    /// Asks `refresher` for a new topology whenever a leader is unknown.
    pub fn with_topology_refresh(mut self, refresher: TopologyHandle) -> Self {
        self.set_topology_refresh(refresher);
        self
    }

    pub fn set_topology_refresh(&mut self, refresher: TopologyHandle) {
        self.refresher = Some(refresher);
    }

    /// Open requests not completed yet.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn open_machine(
        &self,
        local_id: u64,
        spec: SubscriptionSpec,
        handler: Option<SharedHandler>,
        reopen: bool,
    ) -> Result<StateMachine<OpenState, OpenContext>, ActorError> {
        let context = OpenContext {
            local_id,
            spec,
            handler,
            reopen,
            output: self.output.clone(),
            topology: self.topology.clone(),
            refresher: self.refresher.clone(),
            clock: self.clock.clone(),
            request_timeout: self.request_timeout,
            remote: None,
            request: None,
            deadline: None,
            backoff: ExponentialBackoffBuilder::new()
                .with_initial_interval(INITIAL_REOPEN_INTERVAL.min(self.request_timeout))
                .with_max_interval(self.request_timeout)
                .with_max_elapsed_time(None)
                .build(),
            retry_at: None,
            refresh: None,
            refreshed: false,
            outcome: None,
        };
        StateMachine::builder(move || context)
            .name(&format!("{}-open-{}", self.name, local_id))
            .initial_state(OpenState::Request)
            .state(OpenState::Request, RequestOpen)
            .state(OpenState::Await, AwaitOpen)
            .state(OpenState::Backoff, BackoffOpen)
            .wait_state(OpenState::Done, Idle)
            .from(OpenState::Request)
            .take(TRANSITION_DEFAULT)
            .to(OpenState::Await)
            .from(OpenState::Request)
            .take(TRANSITION_RETRY)
            .to(OpenState::Backoff)
            .from(OpenState::Request)
            .take(TRANSITION_FAILED)
            .to(OpenState::Done)
            .from(OpenState::Await)
            .take(TRANSITION_DEFAULT)
            .to(OpenState::Done)
            .from(OpenState::Await)
            .take(TRANSITION_RETRY)
            .to(OpenState::Backoff)
            .from(OpenState::Await)
            .take(TRANSITION_FAILED)
            .to(OpenState::Done)
            .from(OpenState::Backoff)
            .take(TRANSITION_DEFAULT)
            .to(OpenState::Request)
            .build()
    }

    fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_recv() {
            applied += 1;
            match command {
                AcquisitionCommand::Open {
                    local_id,
                    spec,
                    handler,
                    reply,
                } => match self.open_machine(local_id, spec, handler, false) {
                    Ok(machine) => self.pending.push(OpenRequest {
                        machine,
                        origin: Origin::User(Some(reply)),
                    }),
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                    }
                },
                AcquisitionCommand::Close { local_id } => {
                    self.close_subscription(local_id)
                }
                AcquisitionCommand::Reopen { remote } => self.reopen_for(&remote),
            }
        }
        applied
    }

    fn close_subscription(&mut self, local_id: u64) {
        self.pending.retain_mut(|request| {
            if request.local_id() != local_id {
                return true;
            }
            request.machine.reset();
            request.reply(Err(Error::Closed));
            debug!("Cancelled pending open of subscription {}.", local_id);
            false
        });

        let Some(subscription) = self.subscriptions.find_local(local_id) else {
            return;
        };
        self.subscriptions.remove(subscription.subscriber_key());
        subscription.mark_closed();

        let message = ControlMessage::CloseSubscription(CloseSubscriptionMessage {
            subscriber_key: subscription.subscriber_key(),
            subscription_type: subscription.subscription_type(),
            partition_id: subscription.partition_id(),
        });
        match message.encode() {
            Ok(payload) => {
                if !self.output.send_message(subscription.remote(), payload) {
                    warn!(
                        "Unable to send close of subscription {} to {}.",
                        subscription.subscriber_key(),
                        subscription.remote()
                    );
                }
            }
            Err(e) => error!("Unable to encode close message: {}", e),
        }
        debug!(
            "Closed subscription {} ({}).",
            local_id,
            subscription.subscriber_key()
        );
    }

    fn reopen_for(&mut self, remote: &RemoteAddress) {
        let affected: Vec<_> = self.subscriptions.subscriptions_for(remote).collect();
        if affected.is_empty() {
            return;
        }
        info!(
            "Connection to {} lost, reopening {} {} subscriptions.",
            remote,
            affected.len(),
            self.name
        );
        for subscription in affected {
            subscription.invalidate();
            self.subscriptions.remove(subscription.subscriber_key());
            match self.open_machine(
                subscription.local_id(),
                subscription.spec().clone(),
                subscription.handler(),
                true,
            ) {
                Ok(machine) => self.pending.push(OpenRequest {
                    machine,
                    origin: Origin::Reopen,
                }),
                Err(e) => error!(
                    "Unable to reopen subscription {}: {}",
                    subscription.local_id(),
                    e
                ),
            }
        }
    }

    fn drive_requests(&mut self) -> Result<usize, ActorError> {
        let mut work = 0;
        for request in self.pending.iter_mut() {
            work += request.machine.do_work()?;
        }

        let mut index = 0;
        while index < self.pending.len() {
            if self.pending[index].machine.current_state() == OpenState::Done {
                let request = self.pending.remove(index);
                self.complete(request);
            } else {
                index += 1;
            }
        }
        Ok(work)
    }

    fn complete(&mut self, mut request: OpenRequest) {
        let context = request.machine.context_mut();
        let outcome = context.outcome.take().unwrap_or(Err(RequestError::Closed));
        let remote = context.remote.clone();

        match (outcome, remote) {
            (Ok(response), Some(remote)) => {
                let local_id = context.local_id;
                let subscription = Arc::new(EventSubscription::with_handler(
                    response.subscriber_key,
                    local_id,
                    remote,
                    context.spec.clone(),
                    response.lock_owner,
                    response.credits,
                    context.handler.clone(),
                ));
                debug!(
                    "Opened subscription {} as {} on {} with {} credits.",
                    local_id,
                    response.subscriber_key,
                    subscription.remote(),
                    response.credits
                );
                if let Some(previous) = self.subscriptions.add(subscription) {
                    warn!(
                        "Subscriber key {} was reused, dropping subscription {}.",
                        previous.subscriber_key(),
                        previous.local_id()
                    );
                    previous.mark_closed();
                }
                request.reply(Ok(SubscriptionHandle {
                    local_id,
                    acquisition: self.handle.clone(),
                }));
            }
            (Ok(_), None) => request.reply(Err(Error::Request(
                RequestError::Transport("Open completed without a broker.".to_owned()),
            ))),
            (Err(error), _) => {
                debug!("Opening subscription failed: {}", error);
                request.reply(Err(Error::Request(error)));
            }
        }
    }

    fn replenish_credits(&mut self) -> usize {
        let mut sent = 0;
        for subscription in self.subscriptions.snapshot().iter() {
            if !subscription.is_open() {
                continue;
            }
            let deficit = subscription.credit_deficit();
            if deficit == 0 || deficit < refill_batch(subscription.capacity()) {
                continue;
            }
            let message = ControlMessage::IncreaseCredits(CreditsMessage {
                subscriber_key: subscription.subscriber_key(),
                subscription_type: subscription.subscription_type(),
                partition_id: subscription.partition_id(),
                credits: deficit,
            });
            let payload = match message.encode() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Unable to encode credits message: {}", e);
                    continue;
                }
            };
            if !self.output.send_message(subscription.remote(), payload) {
                // Retried on the next slice.
                break;
            }
            subscription.add_credits(deficit);
            sent += 1;
        }
        sent
    }
}

impl Actor for EventAcquisition {
    fn do_work(&mut self) -> Result<usize, ActorError> {
        let mut work = self.apply_commands();
        work += self.drive_requests()?;
        work += self.replenish_credits();
        Ok(work)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for EventAcquisition {
    fn drop(&mut self) {
        for request in self.pending.iter_mut() {
            request.machine.reset();
        }
    }
}
