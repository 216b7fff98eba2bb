// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! A runner is one worker thread of an [`crate::ActorScheduler`]. It owns an
//! ordered list of actors and loops over them round-robin:
//!
//! 1. apply pending add/remove commands,
//! 2. give every actor up to `iterations(priority)` consecutive slices, moving
//!    on as soon as the actor reports no work,
//! 3. hand the pass's total work count to the idle strategy.
//!
//! Errors and panics raised inside a slice are passed to the error handler;
//! the actor stays scheduled.
//!

use crate::{Actor, ActorPriority, Error, idle::IdleStrategy};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use std::{
    any::Any,
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

/// Callback receiving the name of the failing actor and its error.
pub type ErrorHandler = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// Logs the error and keeps going.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|actor, error| {
        error!("Actor {} failed: {}", actor, error);
    })
}

thread_local! {
    /// Id of the runner driving the current thread, zero elsewhere.
    static CURRENT_RUNNER: Cell<usize> = const { Cell::new(0) };
}

/// Returns true when called from the thread of runner `runner_id`.
pub(crate) fn on_runner(runner_id: usize) -> bool {
    CURRENT_RUNNER.with(|current| current.get() == runner_id)
}

/// Returns true when called from the thread of any runner.
pub(crate) fn on_any_runner() -> bool {
    CURRENT_RUNNER.with(|current| current.get() != 0)
}

pub(crate) type CommandSender = mpsc::UnboundedSender<RunnerCommand>;
pub(crate) type CommandReceiver = mpsc::UnboundedReceiver<RunnerCommand>;

/// An actor together with its bookkeeping on a runner.
pub(crate) struct ScheduledActor {
    pub(crate) id: u64,
    pub(crate) actor: Box<dyn Actor>,
    pub(crate) priority: ActorPriority,
    /// Set by the actor reference on close; checked before every slice.
    pub(crate) closed: Arc<AtomicBool>,
}

/// Commands a scheduler sends to one of its runners.
pub(crate) enum RunnerCommand {
    Add(ScheduledActor),
    Remove {
        id: u64,
        done: Option<oneshot::Sender<()>>,
    },
}

pub(crate) struct Runner {
    id: usize,
    name: String,
    actors: Vec<ScheduledActor>,
    commands: CommandReceiver,
    idle_strategy: Box<dyn IdleStrategy>,
    error_handler: ErrorHandler,
    base_iterations_per_actor: usize,
    load: Arc<AtomicUsize>,
    token: CancellationToken,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        name: String,
        commands: CommandReceiver,
        idle_strategy: Box<dyn IdleStrategy>,
        error_handler: ErrorHandler,
        base_iterations_per_actor: usize,
        load: Arc<AtomicUsize>,
        token: CancellationToken,
    ) -> Self {
        debug!("Creating new actor runner {}.", name);
        Runner {
            id,
            name,
            actors: Vec::new(),
            commands,
            idle_strategy,
            error_handler,
            base_iterations_per_actor,
            load,
            token,
        }
    }

    /// Runs until the scheduler's token is cancelled.
    pub(crate) fn run(mut self) {
        CURRENT_RUNNER.with(|current| current.set(self.id));
        debug!("Running actor runner {}", self.name);

        while !self.token.is_cancelled() {
            let mut work_count = self.apply_commands();
            work_count += self.run_pass();
            self.idle_strategy.idle_for(work_count);
        }

        self.apply_commands();
        let remaining = self.actors.len();
        self.actors.clear();
        self.load.store(0, Ordering::Release);
        CURRENT_RUNNER.with(|current| current.set(0));
        debug!(
            "Actor runner {} stopped, dropped {} actors.",
            self.name, remaining
        );
    }

    /// Applies queued commands and returns how many were applied.
    pub(crate) fn apply_commands(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(command) = self.commands.try_recv() {
            applied += 1;
            match command {
                RunnerCommand::Add(scheduled) => {
                    debug!(
                        "Runner {} takes actor {} ({}).",
                        self.name,
                        scheduled.actor.name(),
                        scheduled.id
                    );
                    self.actors.push(scheduled);
                }
                RunnerCommand::Remove { id, done } => {
                    let before = self.actors.len();
                    self.actors.retain(|scheduled| scheduled.id != id);
                    if self.actors.len() < before {
                        self.load.fetch_sub(1, Ordering::AcqRel);
                        debug!("Runner {} removed actor {}.", self.name, id);
                    }
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
            }
        }
        applied
    }

    /// One round-robin pass over all actors.
    pub(crate) fn run_pass(&mut self) -> usize {
        let mut total = 0;
        for scheduled in self.actors.iter_mut() {
            let iterations =
                scheduled.priority.iterations(self.base_iterations_per_actor);
            for _ in 0..iterations {
                if scheduled.closed.load(Ordering::Acquire) {
                    break;
                }
                let actor = &mut scheduled.actor;
                match panic::catch_unwind(AssertUnwindSafe(|| actor.do_work()))
                {
                    Ok(Ok(0)) => break,
                    Ok(Ok(work)) => total += work,
                    Ok(Err(error)) => {
                        (self.error_handler)(scheduled.actor.name(), &error);
                        break;
                    }
                    Err(payload) => {
                        let error = Error::Panicked {
                            actor: scheduled.actor.name().to_owned(),
                            message: panic_message(payload.as_ref()),
                        };
                        (self.error_handler)(scheduled.actor.name(), &error);
                        break;
                    }
                }
            }
        }
        total
    }

    #[cfg(test)]
    pub(crate) fn actor_names(&self) -> Vec<String> {
        self.actors
            .iter()
            .map(|scheduled| scheduled.actor.name().to_owned())
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
