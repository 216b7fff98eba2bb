// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # State machine engine
//!
//! Drives multi-step protocols without parking a thread per request. Every
//! state performs one non-blocking slice of work per [`StateMachine::do_work`]
//! call; protocol state lives in a plain context struct owned by the machine.
//!
//! ```text
//!   ┌──────┐  DEFAULT  ┌─────────┐  DEFAULT  ┌───────┐
//!   │ Init │ ────────→ │ Request │ ────────→ │ Await │
//!   └──────┘           └─────────┘           └───────┘
//!       ∧                                        │
//!       └──────────────── DEFAULT ───────────────┘
//! ```
//!
//! Transitions are looked up in a static table keyed by (state, code). A
//! missing entry is a programming error and surfaces as
//! [`Error::NoTransition`].
//!

use crate::{Actor, Error};

use tracing::debug;

use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    ops::{Deref, DerefMut},
};

/// Symbolic transition code.
pub type TransitionCode = u32;

/// The code most protocols use for their single forward edge.
pub const TRANSITION_DEFAULT: TransitionCode = 0;

/// Identifier of a state. Usually a small fieldless enum.
pub trait StateId: Copy + Eq + Hash + Debug + Send + 'static {}

impl<T> StateId for T where T: Copy + Eq + Hash + Debug + Send + 'static {}

/// Protocol specific data owned by a state machine.
pub trait MachineContext: Send + 'static {
    /// Restores sentinel values. Called by [`StateMachine::reset`].
    fn reset(&mut self);
}

/// Context handed to active states: the protocol data plus the pending
/// transition request.
pub struct StateContext<C> {
    data: C,
    pending: Option<TransitionCode>,
}

impl<C> StateContext<C> {
    fn new(data: C) -> Self {
        StateContext {
            data,
            pending: None,
        }
    }

    /// Requests a transition, applied after the current slice returns.
    pub fn take(&mut self, code: TransitionCode) {
        self.pending = Some(code);
    }

    pub fn pending(&self) -> Option<TransitionCode> {
        self.pending
    }
}

impl<C> Deref for StateContext<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.data
    }
}

impl<C> DerefMut for StateContext<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.data
    }
}

/// A state that does work and may request a transition.
pub trait State<C>: Send {
    fn work(&mut self, ctx: &mut StateContext<C>) -> Result<usize, Error>;
}

/// A state that waits for an external trigger. It cannot transition itself.
pub trait WaitState<C>: Send {
    fn work(&mut self, ctx: &mut C) -> Result<(), Error>;
}

/// Wait state without side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct Idle;

impl<C> WaitState<C> for Idle {
    fn work(&mut self, _ctx: &mut C) -> Result<(), Error> {
        Ok(())
    }
}

enum StateBehavior<C> {
    Active(Box<dyn State<C>>),
    Wait(Box<dyn WaitState<C>>),
}

/// Builder for [`StateMachine`].
pub struct StateMachineBuilder<S, C> {
    context_factory: Box<dyn FnOnce() -> C>,
    initial: Option<S>,
    states: HashMap<S, StateBehavior<C>>,
    transitions: HashMap<(S, TransitionCode), S>,
    name: String,
}

/// Edge under construction: `from(a).take(code).to(b)`.
pub struct TransitionFrom<S, C> {
    builder: StateMachineBuilder<S, C>,
    from: S,
}

pub struct TransitionTake<S, C> {
    builder: StateMachineBuilder<S, C>,
    from: S,
    code: TransitionCode,
}

impl<S, C> TransitionFrom<S, C> {
    pub fn take(self, code: TransitionCode) -> TransitionTake<S, C> {
        TransitionTake {
            builder: self.builder,
            from: self.from,
            code,
        }
    }
}

impl<S: StateId, C> TransitionTake<S, C> {
    pub fn to(mut self, to: S) -> StateMachineBuilder<S, C> {
        self.builder.transitions.insert((self.from, self.code), to);
        self.builder
    }
}

impl<S: StateId, C: MachineContext> StateMachineBuilder<S, C> {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    pub fn initial_state(mut self, state: S) -> Self {
        self.initial = Some(state);
        self
    }

    /// Registers an active state.
    pub fn state(mut self, id: S, state: impl State<C> + 'static) -> Self {
        self.states.insert(id, StateBehavior::Active(Box::new(state)));
        self
    }

    /// Registers a wait state.
    pub fn wait_state(
        mut self,
        id: S,
        state: impl WaitState<C> + 'static,
    ) -> Self {
        self.states.insert(id, StateBehavior::Wait(Box::new(state)));
        self
    }

    pub fn from(self, from: S) -> TransitionFrom<S, C> {
        TransitionFrom {
            builder: self,
            from,
        }
    }

    /// Validates the table and creates the context.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownState`] when the initial state is missing or any edge
    /// references an unregistered state.
    pub fn build(self) -> Result<StateMachine<S, C>, Error> {
        let initial = self
            .initial
            .ok_or_else(|| Error::UnknownState("<no initial state>".to_owned()))?;
        if !self.states.contains_key(&initial) {
            return Err(Error::UnknownState(format!("{:?}", initial)));
        }
        for ((from, _), to) in self.transitions.iter() {
            for state in [from, to] {
                if !self.states.contains_key(state) {
                    return Err(Error::UnknownState(format!("{:?}", state)));
                }
            }
        }

        let mut data = (self.context_factory)();
        data.reset();

        Ok(StateMachine {
            name: self.name,
            initial,
            current: initial,
            states: self.states,
            transitions: self.transitions,
            context: StateContext::new(data),
        })
    }
}

/// Generic finite state machine executor.
pub struct StateMachine<S, C> {
    name: String,
    initial: S,
    current: S,
    states: HashMap<S, StateBehavior<C>>,
    transitions: HashMap<(S, TransitionCode), S>,
    context: StateContext<C>,
}

impl<S: StateId, C: MachineContext> StateMachine<S, C> {
    /// Starts a builder whose context is created by `context_factory`.
    pub fn builder<F>(context_factory: F) -> StateMachineBuilder<S, C>
    where
        F: FnOnce() -> C + 'static,
    {
        StateMachineBuilder {
            context_factory: Box::new(context_factory),
            initial: None,
            states: HashMap::new(),
            transitions: HashMap::new(),
            name: "state-machine".to_owned(),
        }
    }

    pub fn current_state(&self) -> S {
        self.current
    }

    pub fn context(&self) -> &C {
        &self.context.data
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context.data
    }

    /// Returns to the initial state and resets the context.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.context.pending = None;
        self.context.data.reset();
    }

    /// Transitions immediately.
    ///
    /// # Errors
    ///
    /// [`Error::NoTransition`] when (current state, code) has no edge. The
    /// machine stays in its current state.
    pub fn take(&mut self, code: TransitionCode) -> Result<(), Error> {
        let next = self.next_state(code)?;
        debug!(
            "{}: {:?} --{}--> {:?}",
            self.name, self.current, code, next
        );
        self.current = next;
        Ok(())
    }

    fn next_state(&self, code: TransitionCode) -> Result<S, Error> {
        self.transitions
            .get(&(self.current, code))
            .copied()
            .ok_or_else(|| Error::no_transition(&self.current, code))
    }

    /// Runs one slice of the current state, then applies the transition it
    /// requested, if any.
    pub fn do_work(&mut self) -> Result<usize, Error> {
        let state = self
            .states
            .get_mut(&self.current)
            .ok_or_else(|| Error::UnknownState(format!("{:?}", self.current)))?;

        let work_count = match state {
            StateBehavior::Active(state) => state.work(&mut self.context)?,
            StateBehavior::Wait(state) => {
                state.work(&mut self.context.data)?;
                0
            }
        };

        if let Some(code) = self.context.pending.take() {
            self.take(code)?;
        }
        Ok(work_count)
    }
}

impl<S: StateId, C: MachineContext> Actor for StateMachine<S, C> {
    fn do_work(&mut self) -> Result<usize, Error> {
        StateMachine::do_work(self)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Phase {
        Waiting,
        Counting,
        Done,
    }

    const TRANSITION_FINISH: TransitionCode = 1;

    #[derive(Default)]
    struct Counter {
        count: usize,
        limit: usize,
    }

    impl MachineContext for Counter {
        fn reset(&mut self) {
            self.count = 0;
        }
    }

    struct Count;

    impl State<Counter> for Count {
        fn work(&mut self, ctx: &mut StateContext<Counter>) -> Result<usize, Error> {
            ctx.count += 1;
            if ctx.count >= ctx.limit {
                ctx.take(TRANSITION_FINISH);
            }
            Ok(1)
        }
    }

    struct Broken;

    impl State<Counter> for Broken {
        fn work(&mut self, ctx: &mut StateContext<Counter>) -> Result<usize, Error> {
            ctx.take(42);
            Ok(1)
        }
    }

    fn machine() -> StateMachine<Phase, Counter> {
        StateMachine::builder(|| Counter {
            count: 0,
            limit: 3,
        })
        .name("counter")
        .initial_state(Phase::Waiting)
        .wait_state(Phase::Waiting, Idle)
        .state(Phase::Counting, Count)
        .wait_state(Phase::Done, Idle)
        .from(Phase::Waiting)
        .take(TRANSITION_DEFAULT)
        .to(Phase::Counting)
        .from(Phase::Counting)
        .take(TRANSITION_FINISH)
        .to(Phase::Done)
        .from(Phase::Done)
        .take(TRANSITION_DEFAULT)
        .to(Phase::Waiting)
        .build()
        .unwrap()
    }

    #[test]
    fn test_wait_state_does_not_move() {
        let mut machine = machine();
        assert_eq!(machine.do_work(), Ok(0));
        assert_eq!(machine.current_state(), Phase::Waiting);
    }

    #[test]
    fn test_pending_transition_applied_after_slice() {
        let mut machine = machine();
        machine.take(TRANSITION_DEFAULT).unwrap();
        assert_eq!(machine.do_work(), Ok(1));
        assert_eq!(machine.do_work(), Ok(1));
        assert_eq!(machine.current_state(), Phase::Counting);
        assert_eq!(machine.do_work(), Ok(1));
        assert_eq!(machine.current_state(), Phase::Done);
        assert_eq!(machine.context().count, 3);
    }

    #[test]
    fn test_reset_returns_to_initial_state() {
        let mut machine = machine();
        machine.take(TRANSITION_DEFAULT).unwrap();
        machine.do_work().unwrap();
        machine.reset();
        assert_eq!(machine.current_state(), Phase::Waiting);
        assert_eq!(machine.context().count, 0);
        assert_eq!(machine.context().limit, 3);
    }

    #[test]
    fn test_unknown_take_is_an_error() {
        let mut machine = machine();
        let result = machine.take(TRANSITION_FINISH);
        assert_eq!(
            result,
            Err(Error::NoTransition {
                state: "Waiting".to_owned(),
                code: TRANSITION_FINISH
            })
        );
        assert_eq!(machine.current_state(), Phase::Waiting);
    }

    #[test]
    fn test_unknown_pending_code_fails_do_work() {
        let mut machine = StateMachine::builder(Counter::default)
            .initial_state(Phase::Counting)
            .state(Phase::Counting, Broken)
            .build()
            .unwrap();
        assert_eq!(
            machine.do_work(),
            Err(Error::NoTransition {
                state: "Counting".to_owned(),
                code: 42
            })
        );
    }

    #[test]
    fn test_build_rejects_unregistered_states() {
        let result = StateMachine::<Phase, Counter>::builder(Counter::default)
            .initial_state(Phase::Waiting)
            .wait_state(Phase::Waiting, Idle)
            .from(Phase::Waiting)
            .take(TRANSITION_DEFAULT)
            .to(Phase::Done)
            .build();
        assert_eq!(result.err(), Some(Error::UnknownState("Done".to_owned())));

        let result = StateMachine::<Phase, Counter>::builder(Counter::default).build();
        assert!(matches!(result, Err(Error::UnknownState(_))));
    }

    #[test]
    fn test_machine_is_an_actor() {
        let mut machine = machine();
        machine.take(TRANSITION_DEFAULT).unwrap();
        let actor: &mut dyn Actor = &mut machine;
        assert_eq!(actor.name(), "counter");
        assert_eq!(actor.do_work(), Ok(1));
    }
}
