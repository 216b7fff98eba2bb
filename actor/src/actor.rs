// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! An actor is a unit of cooperative, non-blocking work. A runner calls
//! [`Actor::do_work`] over and over; each call performs a bounded slice of
//! work and reports how much it did. An actor must never block: network waits
//! are expressed as polling, usually through a [`crate::StateMachine`].
//!

use crate::Error;

use serde::{Deserialize, Serialize};

/// Scheduling weight of an actor within a runner pass.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ActorPriority {
    /// One slice per pass.
    Low,
    /// `base_iterations_per_actor` slices per pass.
    #[default]
    Regular,
    /// Twice the regular number of slices per pass.
    High,
}

impl ActorPriority {
    /// Maximum number of consecutive slices an actor gets in one pass.
    pub fn iterations(&self, base_iterations_per_actor: usize) -> usize {
        let base = base_iterations_per_actor.max(1);
        match self {
            ActorPriority::Low => 1,
            ActorPriority::Regular => base,
            ActorPriority::High => base * 2,
        }
    }
}

/// The `Actor` trait is the single scheduling seam of the runtime.
///
/// # Example
///
/// ```ignore
/// use actor::{Actor, Error};
///
/// struct Counter {
///     remaining: usize,
/// }
///
/// impl Actor for Counter {
///     fn do_work(&mut self) -> Result<usize, Error> {
///         if self.remaining == 0 {
///             return Ok(0);
///         }
///         self.remaining -= 1;
///         Ok(1)
///     }
/// }
/// ```
pub trait Actor: Send + 'static {
    /// Performs one non-blocking slice of work.
    ///
    /// # Returns
    ///
    /// The amount of work done. Zero tells the runner this actor was idle.
    ///
    /// # Errors
    ///
    /// Errors are handed to the scheduler's error handler. The actor stays
    /// scheduled and is called again on the next pass.
    fn do_work(&mut self) -> Result<usize, Error>;

    /// Name used in logs and error reports.
    fn name(&self) -> &str {
        "actor"
    }

    fn priority(&self) -> ActorPriority {
        ActorPriority::Regular
    }
}

impl Actor for Box<dyn Actor> {
    fn do_work(&mut self) -> Result<usize, Error> {
        (**self).do_work()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn priority(&self) -> ActorPriority {
        (**self).priority()
    }
}

/// Adapts a closure into an [`Actor`].
pub struct FnActor<F> {
    name: String,
    work: F,
}

impl<F> FnActor<F>
where
    F: FnMut() -> Result<usize, Error> + Send + 'static,
{
    pub fn new(name: &str, work: F) -> Self {
        FnActor {
            name: name.to_owned(),
            work,
        }
    }
}

impl<F> Actor for FnActor<F>
where
    F: FnMut() -> Result<usize, Error> + Send + 'static,
{
    fn do_work(&mut self) -> Result<usize, Error> {
        (self.work)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
