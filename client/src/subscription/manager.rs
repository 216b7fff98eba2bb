// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Subscription manager
//!
//! Owns the two schedulers of a client. The acquisition scheduler runs a
//! single thread with the collector, both acquisitions and the optional
//! topology manager. The execution scheduler runs the executors that invoke
//! user handlers, so a slow handler never delays credits or reopens.
//!
//! The manager keeps its actors across [`SubscriptionManager::stop`]: the
//! schedulers only run shared wrappers around them, so a later
//! [`SubscriptionManager::start`] resumes with the same open requests and
//! subscriptions.
//!

use actor::{
    Actor, ActorPriority, ActorReference, ActorScheduler, Clock,
    Error as ActorError,
};
use transport::{ClientOutput, InboundMessages, RemoteAddress, TransportListener};

use crate::{
    ClientConfig, Error,
    protocol::SubscriptionType,
    subscription::{
        AcquisitionHandle, EventAcquisition, EventSubscriptions,
        PollableTaskSubscriptionBuilder, PollableTopicSubscriptionBuilder,
        SubscriptionExecutor, TaskSubscriptionBuilder, TopicSubscriptionBuilder,
        collector::EventCollector,
    },
    topology::{TopologyHandle, TopologyManager, TopologyView},
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use std::sync::Arc;

/// Schedules an actor owned elsewhere. Removing the wrapper from its
/// runner leaves the actor itself intact.
struct SharedActor<A: Actor> {
    name: String,
    priority: ActorPriority,
    actor: Arc<Mutex<A>>,
}

impl<A: Actor> SharedActor<A> {
    fn new(actor: &Arc<Mutex<A>>) -> Self {
        let (name, priority) = {
            let actor = actor.lock();
            (actor.name().to_owned(), actor.priority())
        };
        SharedActor {
            name,
            priority,
            actor: actor.clone(),
        }
    }
}

impl<A: Actor> Actor for SharedActor<A> {
    fn do_work(&mut self) -> Result<usize, ActorError> {
        self.actor.lock().do_work()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> ActorPriority {
        self.priority
    }
}

/// Actors run on the acquisition scheduler while started.
struct AcquisitionActors {
    collector: Arc<Mutex<EventCollector>>,
    task: Arc<Mutex<EventAcquisition>>,
    topic: Arc<Mutex<EventAcquisition>>,
    topology: Option<Arc<Mutex<TopologyManager>>>,
}

/// Entry point for opening and closing subscriptions.
pub struct SubscriptionManager {
    config: ClientConfig,
    acquisition_scheduler: ActorScheduler,
    execution_scheduler: ActorScheduler,
    task: AcquisitionHandle,
    topic: AcquisitionHandle,
    actors: AcquisitionActors,
    /// Scheduled wrappers. Empty while stopped.
    references: Mutex<Vec<ActorReference>>,
}

impl SubscriptionManager {
    /// Builds the schedulers and actors. Nothing runs before [`Self::start`].
    ///
    /// # Arguments
    ///
    /// * `config` - Client settings.
    /// * `output` - Where requests and messages are sent.
    /// * `inbound` - Source of pushed event frames.
    /// * `topology` - Resolves partition leaders.
    /// * `clock` - Time source for deadlines and backoff.
    ///
    /// # Errors
    ///
    /// Returns an error if a scheduler can't start its threads.
    pub fn new(
        config: ClientConfig,
        output: Arc<dyn ClientOutput>,
        inbound: Box<dyn InboundMessages>,
        topology: Arc<dyn TopologyView>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let acquisition_scheduler = ActorScheduler::builder()
            .name("subscription-acquisition")
            .thread_count(1)
            .idle_strategy(config.idle_strategy.clone())
            .build()?;
        let execution_scheduler = ActorScheduler::builder()
            .name("subscription-execution")
            .thread_count(config.execution_threads)
            .idle_strategy(config.idle_strategy.clone())
            .build()?;

        let (task, task_handle) = EventAcquisition::new(
            SubscriptionType::Task,
            Arc::new(EventSubscriptions::new()),
            output.clone(),
            topology.clone(),
            clock.clone(),
            config.request_timeout(),
        );
        let (topic, topic_handle) = EventAcquisition::new(
            SubscriptionType::Topic,
            Arc::new(EventSubscriptions::new()),
            output,
            topology,
            clock,
            config.request_timeout(),
        );
        let collector =
            EventCollector::new(inbound, task_handle.clone(), topic_handle.clone());

        Ok(SubscriptionManager {
            config,
            acquisition_scheduler,
            execution_scheduler,
            task: task_handle,
            topic: topic_handle,
            actors: AcquisitionActors {
                collector: Arc::new(Mutex::new(collector)),
                task: Arc::new(Mutex::new(task)),
                topic: Arc::new(Mutex::new(topic)),
                topology: None,
            },
            references: Mutex::new(Vec::new()),
        })
    }

    /// Runs `manager` next to the acquisitions and lets them ask it for a
    /// refresh when a leader is unknown. Takes effect on the next start.
    pub fn with_topology_manager(
        self,
        manager: TopologyManager,
        handle: TopologyHandle,
    ) -> Self {
        let mut this = self;
        if !this.references.lock().is_empty() {
            warn!("Subscription manager running, topology manager used after restart.");
        }
        this.actors.task.lock().set_topology_refresh(handle.clone());
        this.actors.topic.lock().set_topology_refresh(handle);
        this.actors.topology = Some(Arc::new(Mutex::new(manager)));
        this
    }

    /// Schedules all actors. Calling it while started only logs a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if a scheduler was already closed. Nothing stays
    /// scheduled in that case.
    pub fn start(&self) -> Result<(), Error> {
        let mut references = self.references.lock();
        if !references.is_empty() {
            warn!("Subscription manager already started.");
            return Ok(());
        }

        let mut scheduled = Vec::new();
        if let Err(error) = self.schedule_all(&mut scheduled) {
            for reference in scheduled.iter() {
                reference.close();
            }
            return Err(error);
        }
        references.extend(scheduled);
        Ok(())
    }

    fn schedule_all(&self, scheduled: &mut Vec<ActorReference>) -> Result<(), Error> {
        let actors = &self.actors;
        if let Some(topology) = &actors.topology {
            scheduled.push(
                self.acquisition_scheduler
                    .schedule(SharedActor::new(topology))?,
            );
        }
        scheduled.push(
            self.acquisition_scheduler
                .schedule(SharedActor::new(&actors.collector))?,
        );
        scheduled.push(
            self.acquisition_scheduler
                .schedule(SharedActor::new(&actors.task))?,
        );
        scheduled.push(
            self.acquisition_scheduler
                .schedule(SharedActor::new(&actors.topic))?,
        );

        let executors = self.execution_scheduler.thread_count();
        for index in 0..executors {
            for handle in [&self.task, &self.topic] {
                let name = match handle.subscription_type() {
                    SubscriptionType::Task => format!("task-executor-{}", index),
                    SubscriptionType::Topic => format!("topic-executor-{}", index),
                };
                let executor = SubscriptionExecutor::new(
                    &name,
                    handle.subscriptions().clone(),
                    self.config.max_subscriptions_per_slice,
                    self.config.executor_batch_size,
                );
                scheduled.push(self.execution_scheduler.schedule(executor)?);
            }
        }
        info!(
            "Subscription manager started with {} executors per class.",
            executors
        );
        Ok(())
    }

    /// Removes every actor from its scheduler. Subscriptions stay registered
    /// and open requests stay pending until the next start.
    pub fn stop(&self) {
        let references: Vec<ActorReference> =
            self.references.lock().drain(..).collect();
        debug!("Stopping {} subscription actors.", references.len());
        for reference in references.iter() {
            reference.close();
        }
    }

    /// Stops the actors, forgets every subscription and shuts both
    /// schedulers down. Brokers are not notified.
    pub fn close(&self) {
        self.stop();
        let dropped = self.task.subscriptions().remove_all().len()
            + self.topic.subscriptions().remove_all().len();
        if dropped > 0 {
            debug!("Dropped {} subscriptions on close.", dropped);
        }
        self.acquisition_scheduler.close();
        self.execution_scheduler.close();
    }

    /// Queues the close of every registered subscription of both classes.
    ///
    /// # Returns
    ///
    /// The number of closes queued.
    pub fn close_all_subscriptions(&self) -> usize {
        let mut queued = 0;
        for handle in [&self.task, &self.topic] {
            for subscription in handle.subscriptions().snapshot().iter() {
                if handle.close(subscription.local_id()) {
                    queued += 1;
                }
            }
        }
        debug!("Queued the close of {} subscriptions.", queued);
        queued
    }

    pub fn new_task_subscription(&self, topic: &str) -> TaskSubscriptionBuilder {
        TaskSubscriptionBuilder::new(self.task.clone(), topic, &self.config)
    }

    pub fn new_topic_subscription(&self, topic: &str) -> TopicSubscriptionBuilder {
        TopicSubscriptionBuilder::new(self.topic.clone(), topic, &self.config)
    }

    /// A task subscription whose tasks the user drains with
    /// [`SubscriptionHandle::poll`](crate::subscription::SubscriptionHandle::poll).
    pub fn new_pollable_task_subscription(
        &self,
        topic: &str,
    ) -> PollableTaskSubscriptionBuilder {
        PollableTaskSubscriptionBuilder::new(self.task.clone(), topic, &self.config)
    }

    /// A topic subscription whose events the user drains with
    /// [`SubscriptionHandle::poll`](crate::subscription::SubscriptionHandle::poll).
    pub fn new_pollable_topic_subscription(
        &self,
        topic: &str,
    ) -> PollableTopicSubscriptionBuilder {
        PollableTopicSubscriptionBuilder::new(self.topic.clone(), topic, &self.config)
    }

    pub fn task_subscriptions(&self) -> &AcquisitionHandle {
        &self.task
    }

    pub fn topic_subscriptions(&self) -> &AcquisitionHandle {
        &self.topic
    }
}

impl TransportListener for SubscriptionManager {
    fn on_connection_closed(&self, remote: &RemoteAddress) {
        debug!("Connection to {} closed, reopening its subscriptions.", remote);
        self.task.reopen_subscriptions_for(remote);
        self.topic.reopen_subscriptions_for(remote);
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        protocol::SubscribedEvent,
        topology::{SharedTopology, TopologySnapshot},
    };

    use actor::{IdleStrategyConfig, SystemClock};
    use transport::{MemoryOutput, ring_buffer};

    use tracing_test::traced_test;

    use std::{
        thread,
        time::{Duration, Instant},
    };

    fn eventually(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn manager(output: &MemoryOutput) -> SubscriptionManager {
        manager_with(output, SharedTopology::default())
    }

    fn manager_with(
        output: &MemoryOutput,
        topology: SharedTopology,
    ) -> SubscriptionManager {
        let config = ClientConfig {
            execution_threads: 1,
            idle_strategy: IdleStrategyConfig::BusySpin,
            ..Default::default()
        };
        let (_, consumer) = ring_buffer(256).unwrap();
        SubscriptionManager::new(
            config,
            Arc::new(output.clone()),
            Box::new(consumer),
            Arc::new(topology),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    #[test]
    #[traced_test]
    fn test_start_twice_warns() {
        let output = MemoryOutput::new();
        let manager = manager(&output);
        manager.start().unwrap();
        manager.start().unwrap();
        assert!(logs_contain("Subscription manager already started."));
        manager.close();
    }

    #[test]
    fn test_builders_use_their_class() {
        let output = MemoryOutput::new();
        let manager = manager(&output);
        assert_eq!(
            manager.task_subscriptions().subscription_type(),
            SubscriptionType::Task
        );
        assert_eq!(
            manager.topic_subscriptions().subscription_type(),
            SubscriptionType::Topic
        );
        let future = manager
            .new_topic_subscription("orders")
            .name("audit")
            .handler(|_: &SubscribedEvent| Ok(()))
            .open();
        assert!(future.is_ok());
    }

    #[test]
    fn test_close_all_subscriptions_on_empty_manager() {
        let output = MemoryOutput::new();
        let manager = manager(&output);
        assert_eq!(manager.close_all_subscriptions(), 0);
    }

    #[test]
    fn test_restarted_manager_sends_open_requests() {
        let output = MemoryOutput::new();
        let manager = manager_with(
            &output,
            SharedTopology::new(TopologySnapshot::new().with_leader(
                "orders",
                0,
                RemoteAddress::new("broker", 1),
            )),
        );
        manager.start().unwrap();
        manager.stop();

        let _open = manager
            .new_topic_subscription("orders")
            .name("audit")
            .handler(|_: &SubscribedEvent| Ok(()))
            .open()
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(output.requests().is_empty());

        manager.start().unwrap();
        assert!(eventually(|| output.requests().len() == 1));
        manager.close();
    }

    #[test]
    fn test_pollable_builders_use_their_class() {
        let output = MemoryOutput::new();
        let manager = manager(&output);
        assert!(
            manager
                .new_pollable_task_subscription("orders")
                .task_type("ship")
                .open()
                .is_ok()
        );
        assert!(
            manager
                .new_pollable_topic_subscription("orders")
                .name("audit")
                .open()
                .is_ok()
        );
    }
}
