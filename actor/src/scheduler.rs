// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor scheduler
//!
//! The `scheduler` module provides the [`ActorScheduler`] type. A scheduler
//! owns N runner threads and assigns every scheduled actor to the least
//! loaded runner. Scheduling returns an [`ActorReference`] that removes the
//! actor again.
//!

use crate::{
    Actor, ActorPriority, Error,
    idle::IdleStrategyConfig,
    runner::{
        CommandSender, ErrorHandler, Runner, RunnerCommand, ScheduledActor,
        default_error_handler, on_any_runner, on_runner,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
};

/// Default number of consecutive slices a regular actor gets per pass.
pub const DEFAULT_BASE_ITERATIONS_PER_ACTOR: usize = 5;

static NEXT_RUNNER_ID: AtomicUsize = AtomicUsize::new(1);

/// Resolves the number of runner threads.
///
/// The maximum is one less than the available parallelism, and at least one.
/// A configured value of zero selects the maximum, larger values are clamped.
pub fn resolve_thread_count(configured: usize, available_parallelism: usize) -> usize {
    let max_threads = available_parallelism.saturating_sub(1).max(1);
    if configured == 0 {
        max_threads
    } else if configured > max_threads {
        warn!(
            "Configured thread count {} is larger than max thread count {}. Falling back to max thread count.",
            configured, max_threads
        );
        max_threads
    } else {
        configured
    }
}

/// Serializable scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub name: String,
    /// Zero selects `available parallelism - 1`.
    pub thread_count: usize,
    pub idle_strategy: IdleStrategyConfig,
    pub base_iterations_per_actor: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            name: "scheduler".to_owned(),
            thread_count: 0,
            idle_strategy: IdleStrategyConfig::default(),
            base_iterations_per_actor: DEFAULT_BASE_ITERATIONS_PER_ACTOR,
        }
    }
}

impl SchedulerConfig {
    /// Thread count after clamping against the given available parallelism.
    pub fn resolved_thread_count(&self, available_parallelism: usize) -> usize {
        resolve_thread_count(self.thread_count, available_parallelism)
    }
}

/// Builder for [`ActorScheduler`].
pub struct ActorSchedulerBuilder {
    name: String,
    thread_count: usize,
    idle_strategy: IdleStrategyConfig,
    base_iterations_per_actor: usize,
    error_handler: ErrorHandler,
}

impl Default for ActorSchedulerBuilder {
    fn default() -> Self {
        ActorSchedulerBuilder {
            name: "scheduler".to_owned(),
            thread_count: 1,
            idle_strategy: IdleStrategyConfig::default(),
            base_iterations_per_actor: DEFAULT_BASE_ITERATIONS_PER_ACTOR,
            error_handler: default_error_handler(),
        }
    }
}

impl ActorSchedulerBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    /// Exact number of runner threads, at least one.
    pub fn thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count.max(1);
        self
    }

    pub fn idle_strategy(mut self, idle_strategy: IdleStrategyConfig) -> Self {
        self.idle_strategy = idle_strategy;
        self
    }

    pub fn base_iterations_per_actor(mut self, iterations: usize) -> Self {
        self.base_iterations_per_actor = iterations.max(1);
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &Error) + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Starts the runner threads.
    pub fn build(self) -> Result<ActorScheduler, Error> {
        let token = CancellationToken::new();
        let mut runners = Vec::with_capacity(self.thread_count);

        for index in 0..self.thread_count {
            let id = NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = mpsc::unbounded_channel();
            let load = Arc::new(AtomicUsize::new(0));
            let runner_name = format!("{}-runner-{}", self.name, index);
            let runner = Runner::new(
                id,
                runner_name.clone(),
                receiver,
                self.idle_strategy.build(),
                self.error_handler.clone(),
                self.base_iterations_per_actor,
                load.clone(),
                token.clone(),
            );
            let spawned = thread::Builder::new()
                .name(runner_name)
                .spawn(move || runner.run());
            let handle = match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    error!("Can't start runner thread: {}", e);
                    token.cancel();
                    for runner in runners.iter() {
                        RunnerHandle::join(runner);
                    }
                    return Err(Error::Start(e.to_string()));
                }
            };
            runners.push(RunnerHandle {
                id,
                sender,
                load,
                thread: Mutex::new(Some(handle)),
            });
        }

        info!(
            "Started actor scheduler '{}' with {} runners.",
            self.name,
            runners.len()
        );

        Ok(ActorScheduler {
            name: self.name,
            runners,
            next_runner: AtomicUsize::new(0),
            next_actor_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            token,
        })
    }
}

struct RunnerHandle {
    id: usize,
    sender: CommandSender,
    load: Arc<AtomicUsize>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RunnerHandle {
    fn join(&self) {
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if on_runner(self.id) {
                // A runner can't join itself; it exits once it sees the token.
                return;
            }
            handle.thread().unpark();
            if handle.join().is_err() {
                error!("Runner thread {} terminated with a panic.", self.id);
            }
        }
    }
}

/// Cooperative scheduler over a fixed pool of runner threads.
pub struct ActorScheduler {
    name: String,
    runners: Vec<RunnerHandle>,
    next_runner: AtomicUsize,
    next_actor_id: AtomicU64,
    closed: AtomicBool,
    token: CancellationToken,
}

impl ActorScheduler {
    pub fn builder() -> ActorSchedulerBuilder {
        ActorSchedulerBuilder::default()
    }

    /// Creates a scheduler from configuration, clamping the thread count to
    /// the parallelism available on this machine.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, Error> {
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::builder()
            .name(&config.name)
            .thread_count(config.resolved_thread_count(available))
            .idle_strategy(config.idle_strategy.clone())
            .base_iterations_per_actor(config.base_iterations_per_actor)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_count(&self) -> usize {
        self.runners.len()
    }

    /// Number of actors currently assigned across all runners.
    pub fn actor_count(&self) -> usize {
        self.runners
            .iter()
            .map(|runner| runner.load.load(Ordering::Acquire))
            .sum()
    }

    /// Schedules an actor with the priority it declares.
    pub fn schedule<A: Actor>(&self, actor: A) -> Result<ActorReference, Error> {
        let priority = actor.priority();
        self.schedule_with_priority(actor, priority)
    }

    /// Schedules an actor on the least loaded runner.
    ///
    /// # Errors
    ///
    /// [`Error::SchedulerClosed`] once [`ActorScheduler::close`] was called.
    pub fn schedule_with_priority<A: Actor>(
        &self,
        actor: A,
        priority: ActorPriority,
    ) -> Result<ActorReference, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::SchedulerClosed(self.name.clone()));
        }
        let runner = self.pick_runner();
        let id = self.next_actor_id.fetch_add(1, Ordering::Relaxed);
        let closed = Arc::new(AtomicBool::new(false));
        let name = actor.name().to_owned();

        runner.load.fetch_add(1, Ordering::AcqRel);
        let command = RunnerCommand::Add(ScheduledActor {
            id,
            actor: Box::new(actor),
            priority,
            closed: closed.clone(),
        });
        if runner.sender.send(command).is_err() {
            runner.load.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::SchedulerClosed(self.name.clone()));
        }
        debug!(
            "Scheduled actor {} ({}) on scheduler '{}'.",
            name, id, self.name
        );

        Ok(ActorReference {
            id,
            name,
            runner_id: runner.id,
            sender: runner.sender.clone(),
            closed,
        })
    }

    fn pick_runner(&self) -> &RunnerHandle {
        let start = self.next_runner.fetch_add(1, Ordering::Relaxed);
        let count = self.runners.len();
        let mut best = &self.runners[start % count];
        for offset in 1..count {
            let candidate = &self.runners[(start + offset) % count];
            if candidate.load.load(Ordering::Acquire)
                < best.load.load(Ordering::Acquire)
            {
                best = candidate;
            }
        }
        best
    }

    /// Stops accepting actors, lets in-flight slices finish and joins all
    /// runner threads. Calling it again is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing actor scheduler '{}'...", self.name);
        self.token.cancel();
        for runner in self.runners.iter() {
            runner.join();
        }
        info!("Actor scheduler '{}' closed.", self.name);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for ActorScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handle to a scheduled actor.
pub struct ActorReference {
    id: u64,
    name: String,
    runner_id: usize,
    sender: CommandSender,
    closed: Arc<AtomicBool>,
}

impl ActorReference {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Removes the actor from its runner. Idempotent.
    ///
    /// The runner never interrupts a slice: the actor gets no further slices
    /// once the flag is set, and it is dropped between passes. Called from
    /// a plain thread this waits until the runner dropped the actor. Called
    /// from any runner thread, including runners of other schedulers, it
    /// returns right away: two runners closing each other's actors would
    /// otherwise wait on each other forever.
    ///
    /// Must not be called from within an async context when waiting.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing actor {} ({}).", self.name, self.id);
        if on_any_runner() {
            let _ = self.sender.send(RunnerCommand::Remove {
                id: self.id,
                done: None,
            });
            return;
        }
        let (done, removed) = oneshot::channel();
        if self
            .sender
            .send(RunnerCommand::Remove {
                id: self.id,
                done: Some(done),
            })
            .is_ok()
        {
            // An error means the runner already stopped and dropped the actor.
            let _ = removed.blocking_recv();
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use crate::FnActor;

    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_resolve_thread_count() {
        assert_eq!(resolve_thread_count(0, 8), 7);
        assert_eq!(resolve_thread_count(3, 8), 3);
        assert_eq!(resolve_thread_count(32, 8), 7);
        assert_eq!(resolve_thread_count(0, 1), 1);
        assert_eq!(resolve_thread_count(4, 0), 1);
    }

    #[test]
    #[traced_test]
    fn test_schedule_runs_actor_until_closed() {
        let scheduler = ActorScheduler::builder()
            .name("test")
            .thread_count(2)
            .idle_strategy(IdleStrategyConfig::BusySpin)
            .build()
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let reference = scheduler
            .schedule(FnActor::new("counter", move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            }))
            .unwrap();

        wait_until(|| calls.load(Ordering::SeqCst) > 10);
        assert_eq!(scheduler.actor_count(), 1);

        reference.close();
        reference.close();
        assert!(reference.is_closed());
        assert_eq!(scheduler.actor_count(), 0);
        let after_close = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), after_close);

        scheduler.close();
        assert!(logs_contain("Actor scheduler 'test' closed."));
    }

    #[test]
    fn test_least_loaded_assignment() {
        let scheduler = ActorScheduler::builder()
            .thread_count(3)
            .idle_strategy(IdleStrategyConfig::BusySpin)
            .build()
            .unwrap();
        let references: Vec<_> = (0..6)
            .map(|_| scheduler.schedule(FnActor::new("idle", || Ok(0))).unwrap())
            .collect();
        for runner in scheduler.runners.iter() {
            assert_eq!(runner.load.load(Ordering::SeqCst), 2);
        }
        drop(references);
        scheduler.close();
    }

    #[test]
    fn test_schedule_after_close_fails() {
        let scheduler = ActorScheduler::builder().build().unwrap();
        scheduler.close();
        scheduler.close();
        let result = scheduler.schedule(FnActor::new("late", || Ok(0)));
        assert_eq!(
            result.err(),
            Some(Error::SchedulerClosed("scheduler".to_owned()))
        );
    }

    #[test]
    fn test_failing_actor_is_retried() {
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = failures.clone();
        let scheduler = ActorScheduler::builder()
            .idle_strategy(IdleStrategyConfig::BusySpin)
            .error_handler(move |_, _| {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let _reference = scheduler
            .schedule(FnActor::new("failing", || {
                Err(Error::Functional("always".to_owned()))
            }))
            .unwrap();

        wait_until(|| failures.load(Ordering::SeqCst) >= 3);
        scheduler.close();
    }

    #[test]
    fn test_actor_can_close_itself() {
        let scheduler = ActorScheduler::builder()
            .idle_strategy(IdleStrategyConfig::BusySpin)
            .build()
            .unwrap();
        let slot: Arc<Mutex<Option<ActorReference>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        // Hold the slot lock while scheduling so the first slice sees the reference.
        let mut guard = slot.lock();
        let reference = scheduler
            .schedule(FnActor::new("self-closing", move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                if let Some(reference) = slot_clone.lock().as_ref() {
                    reference.close();
                }
                Ok(1)
            }))
            .unwrap();
        *guard = Some(reference);
        drop(guard);

        wait_until(|| scheduler.actor_count() == 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        scheduler.close();
    }

    #[test]
    fn test_actors_close_each_other_across_runners() {
        let build = |name: &str| {
            ActorScheduler::builder()
                .name(name)
                .thread_count(1)
                .idle_strategy(IdleStrategyConfig::BusySpin)
                .build()
                .unwrap()
        };
        let left = build("left");
        let right = build("right");
        let left_slot: Arc<Mutex<Option<ActorReference>>> = Arc::new(Mutex::new(None));
        let right_slot: Arc<Mutex<Option<ActorReference>>> = Arc::new(Mutex::new(None));

        // Each actor closes the other one, running on the other scheduler.
        let closing = |slot: Arc<Mutex<Option<ActorReference>>>| {
            move || -> Result<usize, Error> {
                if let Some(reference) = slot.lock().as_ref() {
                    reference.close();
                }
                Ok(1)
            }
        };
        let mut left_guard = left_slot.lock();
        let mut right_guard = right_slot.lock();
        let left_reference = left
            .schedule(FnActor::new("left-actor", closing(right_slot.clone())))
            .unwrap();
        let right_reference = right
            .schedule(FnActor::new("right-actor", closing(left_slot.clone())))
            .unwrap();
        *left_guard = Some(left_reference);
        *right_guard = Some(right_reference);
        drop(left_guard);
        drop(right_guard);

        wait_until(|| left.actor_count() == 0 && right.actor_count() == 0);
        left.close();
        right.close();
    }

    #[test]
    fn test_config_roundtrip_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.thread_count, 0);
        assert_eq!(config.resolved_thread_count(4), 3);
        let scheduler = ActorScheduler::from_config(&SchedulerConfig {
            thread_count: 1,
            ..SchedulerConfig::default()
        })
        .unwrap();
        assert_eq!(scheduler.thread_count(), 1);
    }
}
