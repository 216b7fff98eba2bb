// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Topology controller
//!
//! State machine refreshing the cluster topology with one request at a time:
//!
//! ```text
//!   Init --DEFAULT--> RequestTopology --DEFAULT--> AwaitTopology
//!    ^                     |                            |
//!    +------FAILED---------+                            |
//!    +-----------------------DEFAULT--------------------+
//! ```
//!
//! `Init` is a wait state. `RequestTopology` issues the request and arms the
//! deadline. `AwaitTopology` polls the request and reports the outcome,
//! success or failure, through the callback given at construction.
//!

use actor::{
    Actor, Clock, Error as ActorError, Idle, MachineContext, State,
    StateContext, StateMachine, TRANSITION_DEFAULT, TransitionCode,
};
use transport::{
    ClientOutput, ClientRequest, RemoteAddress, RequestError,
    TOPOLOGY_RESPONSE_TEMPLATE, decode_response,
};

use crate::{Error, protocol::ControlMessage, topology::TopologySnapshot};

use tracing::{debug, warn};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Taken when a request could not even be issued.
const TRANSITION_FAILED: TransitionCode = 1;

/// States of the [`TopologyController`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TopologyState {
    Init,
    RequestTopology,
    AwaitTopology,
}

/// Receives the outcome of every refresh.
pub type TopologyCallback =
    Box<dyn FnMut(Result<TopologySnapshot, RequestError>) + Send>;

/// Context of the topology state machine.
pub struct TopologyContext {
    output: Arc<dyn ClientOutput>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    /// Target of the refresh. Survives a reset.
    remote: Option<RemoteAddress>,
    request: Option<Box<dyn ClientRequest>>,
    deadline: Option<Instant>,
    on_outcome: TopologyCallback,
}

impl TopologyContext {
    fn complete(&mut self, outcome: Result<TopologySnapshot, RequestError>) {
        if let Some(mut request) = self.request.take() {
            request.close();
        }
        self.deadline = None;
        match &outcome {
            Ok(snapshot) => debug!(
                "Topology refreshed, {} topics known.",
                snapshot.topics().count()
            ),
            Err(error) => warn!("Topology refresh failed: {}", error),
        }
        (self.on_outcome)(outcome);
    }
}

impl MachineContext for TopologyContext {
    fn reset(&mut self) {
        if let Some(mut request) = self.request.take() {
            request.close();
        }
        self.deadline = None;
    }
}

struct RequestTopology;

impl State<TopologyContext> for RequestTopology {
    fn work(
        &mut self,
        ctx: &mut StateContext<TopologyContext>,
    ) -> Result<usize, ActorError> {
        let Some(remote) = ctx.remote.clone() else {
            ctx.complete(Err(RequestError::Transport(
                "No broker to request the topology from.".to_owned(),
            )));
            ctx.take(TRANSITION_FAILED);
            return Ok(1);
        };
        let payload = match ControlMessage::RequestTopology.encode() {
            Ok(payload) => payload,
            Err(e) => {
                ctx.complete(Err(RequestError::Transport(format!(
                    "Unable to encode topology request: {}",
                    e
                ))));
                ctx.take(TRANSITION_FAILED);
                return Ok(1);
            }
        };

        match ctx.output.send_request(&remote, payload) {
            Some(request) => {
                let deadline = ctx.clock.now() + ctx.request_timeout;
                ctx.request = Some(request);
                ctx.deadline = Some(deadline);
                ctx.take(TRANSITION_DEFAULT);
                Ok(1)
            }
            // Output busy, try again on the next slice.
            None => Ok(0),
        }
    }
}

struct AwaitTopology;

impl State<TopologyContext> for AwaitTopology {
    fn work(
        &mut self,
        ctx: &mut StateContext<TopologyContext>,
    ) -> Result<usize, ActorError> {
        let now = ctx.clock.now();
        let expired = ctx.deadline.is_some_and(|deadline| now >= deadline);
        let timeout = ctx.request_timeout;

        let outcome = match ctx.request.as_mut() {
            Some(request) if request.is_done() => Some(
                request.take_response().and_then(|response| {
                    decode_response::<TopologySnapshot>(
                        &response,
                        TOPOLOGY_RESPONSE_TEMPLATE,
                    )
                }),
            ),
            Some(_) if expired => Some(Err(RequestError::Timeout(timeout))),
            Some(_) => None,
            None => Some(Err(RequestError::Transport(
                "Topology request vanished.".to_owned(),
            ))),
        };

        match outcome {
            Some(outcome) => {
                ctx.complete(outcome);
                ctx.take(TRANSITION_DEFAULT);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

/// Refreshes the topology from one broker at a time.
pub struct TopologyController {
    machine: StateMachine<TopologyState, TopologyContext>,
}

impl TopologyController {
    /// Creates a controller in the `Init` state.
    ///
    /// # Arguments
    ///
    /// * `output` - Where requests are issued.
    /// * `clock` - Time source for the request deadline.
    /// * `request_timeout` - How long to wait for a response.
    /// * `on_outcome` - Invoked from the work slice that completes a refresh.
    ///
    /// # Errors
    ///
    /// Only if the transition table is inconsistent.
    pub fn new<F>(
        output: Arc<dyn ClientOutput>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
        on_outcome: F,
    ) -> Result<Self, Error>
    where
        F: FnMut(Result<TopologySnapshot, RequestError>) + Send + 'static,
    {
        let machine = StateMachine::builder(move || TopologyContext {
            output,
            clock,
            request_timeout,
            remote: None,
            request: None,
            deadline: None,
            on_outcome: Box::new(on_outcome),
        })
        .name("topology-controller")
        .initial_state(TopologyState::Init)
        .wait_state(TopologyState::Init, Idle)
        .state(TopologyState::RequestTopology, RequestTopology)
        .state(TopologyState::AwaitTopology, AwaitTopology)
        .from(TopologyState::Init)
        .take(TRANSITION_DEFAULT)
        .to(TopologyState::RequestTopology)
        .from(TopologyState::RequestTopology)
        .take(TRANSITION_DEFAULT)
        .to(TopologyState::AwaitTopology)
        .from(TopologyState::RequestTopology)
        .take(TRANSITION_FAILED)
        .to(TopologyState::Init)
        .from(TopologyState::AwaitTopology)
        .take(TRANSITION_DEFAULT)
        .to(TopologyState::Init)
        .build()?;
        Ok(TopologyController { machine })
    }

    /// Starts a refresh against `remote`, dropping any refresh in flight.
    pub fn trigger_refresh(&mut self, remote: RemoteAddress) -> Result<(), Error> {
        debug!("Refreshing topology from {}.", remote);
        self.machine.reset();
        self.machine.context_mut().remote = Some(remote);
        self.machine.take(TRANSITION_DEFAULT)?;
        Ok(())
    }

    /// Starts a refresh against the last broker asked.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when no refresh was ever triggered.
    pub fn retrigger(&mut self) -> Result<(), Error> {
        let Some(remote) = self.machine.context().remote.clone() else {
            return Err(Error::InvalidArgument(
                "No broker known to refresh the topology from.".to_owned(),
            ));
        };
        self.trigger_refresh(remote)
    }

    pub fn is_request_in_progress(&self) -> bool {
        self.machine.current_state() != TopologyState::Init
    }

    pub fn current_state(&self) -> TopologyState {
        self.machine.current_state()
    }

    /// Broker of the current or last refresh.
    pub fn remote(&self) -> Option<&RemoteAddress> {
        self.machine.context().remote.as_ref()
    }
}

impl Actor for TopologyController {
    fn do_work(&mut self) -> Result<usize, ActorError> {
        self.machine.do_work()
    }

    fn name(&self) -> &str {
        "topology-controller"
    }
}
