// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Subscription builders
//!
//! Fluent builders for task and topic subscriptions. Defaults come from the
//! [`ClientConfig`]; `open` validates the required fields and queues the
//! open request.
//!
//! The pollable variants take no handler. Their subscriptions are drained
//! by the user through [`SubscriptionHandle::poll`](crate::subscription::SubscriptionHandle::poll).
//!

use crate::{
    ClientConfig, Error,
    protocol::StartPosition,
    subscription::{
        AcquisitionHandle, EventHandler, OpenFuture, SharedHandler,
        SubscriptionParams, SubscriptionSpec, shared_handler,
    },
};

use std::time::Duration;

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, Error> {
    match value.as_deref() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::InvalidArgument(format!("{} must be set.", field))),
    }
}

fn non_empty(value: &str, field: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty.", field)));
    }
    Ok(())
}

fn with_handler(
    handler: Option<SharedHandler>,
) -> Result<SharedHandler, Error> {
    handler.ok_or_else(|| Error::InvalidArgument("Handler must be set.".to_owned()))
}

/// A validated builder: where to open, what to open and who handles it.
type Parts = (AcquisitionHandle, SubscriptionSpec, Option<SharedHandler>);

/// Builds a task subscription.
pub struct TaskSubscriptionBuilder {
    acquisition: AcquisitionHandle,
    topic: String,
    task_type: Option<String>,
    lock_time: Duration,
    lock_owner: String,
    task_fetch_size: u32,
    partition: u32,
    handler: Option<SharedHandler>,
}

impl TaskSubscriptionBuilder {
    pub(crate) fn new(
        acquisition: AcquisitionHandle,
        topic: &str,
        config: &ClientConfig,
    ) -> Self {
        TaskSubscriptionBuilder {
            acquisition,
            topic: topic.to_owned(),
            task_type: None,
            lock_time: config.default_lock_time(),
            lock_owner: config.default_lock_owner.clone(),
            task_fetch_size: config.task_fetch_size,
            partition: 0,
            handler: None,
        }
    }

    /// Type of the tasks to lock. Required.
    pub fn task_type(mut self, task_type: &str) -> Self {
        self.task_type = Some(task_type.to_owned());
        self
    }

    /// How long a locked task stays assigned to this subscriber.
    pub fn lock_time(mut self, lock_time: Duration) -> Self {
        self.lock_time = lock_time;
        self
    }

    pub fn lock_owner(mut self, lock_owner: &str) -> Self {
        self.lock_owner = lock_owner.to_owned();
        self
    }

    /// Tasks buffered at most, and credits requested.
    pub fn task_fetch_size(mut self, task_fetch_size: u32) -> Self {
        self.task_fetch_size = task_fetch_size;
        self
    }

    pub fn partition(mut self, partition: u32) -> Self {
        self.partition = partition;
        self
    }

    /// Handler invoked for every task. Required.
    pub fn handler<H: EventHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(shared_handler(handler));
        self
    }

    /// Validates the builder and queues the open request.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when a required field is missing or a
    /// value is out of range.
    pub fn open(self) -> Result<OpenFuture, Error> {
        let (acquisition, spec, handler) = self.into_parts()?;
        Ok(acquisition.open(spec, with_handler(handler)?))
    }

    fn into_parts(self) -> Result<Parts, Error> {
        non_empty(&self.topic, "Topic")?;
        let task_type = required(&self.task_type, "Task type")?.to_owned();
        non_empty(&self.lock_owner, "Lock owner")?;
        if self.lock_time.is_zero() {
            return Err(Error::InvalidArgument(
                "Lock time must be positive.".to_owned(),
            ));
        }
        if self.task_fetch_size == 0 {
            return Err(Error::InvalidArgument(
                "Task fetch size must be positive.".to_owned(),
            ));
        }

        let spec = SubscriptionSpec {
            topic: self.topic,
            partition_id: self.partition,
            capacity: self.task_fetch_size,
            params: SubscriptionParams::Task {
                task_type,
                lock_duration: self.lock_time,
                lock_owner: self.lock_owner,
            },
        };
        Ok((self.acquisition, spec, self.handler))
    }
}

/// Builds a topic subscription.
pub struct TopicSubscriptionBuilder {
    acquisition: AcquisitionHandle,
    topic: String,
    name: Option<String>,
    start_position: StartPosition,
    force_start: bool,
    prefetch_capacity: u32,
    partition: u32,
    handler: Option<SharedHandler>,
}

impl TopicSubscriptionBuilder {
    pub(crate) fn new(
        acquisition: AcquisitionHandle,
        topic: &str,
        config: &ClientConfig,
    ) -> Self {
        TopicSubscriptionBuilder {
            acquisition,
            topic: topic.to_owned(),
            name: None,
            start_position: StartPosition::default(),
            force_start: false,
            prefetch_capacity: config.topic_subscription_prefetch_capacity,
            partition: 0,
            handler: None,
        }
    }

    /// Name under which the broker tracks the subscription. Required.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn start_at_head(mut self) -> Self {
        self.start_position = StartPosition::Head;
        self
    }

    pub fn start_at_tail(mut self) -> Self {
        self.start_position = StartPosition::Tail;
        self
    }

    pub fn start_at_position(mut self, position: u64) -> Self {
        self.start_position = StartPosition::Position(position);
        self
    }

    /// Start at the configured position even if the broker remembers one.
    pub fn force_start(mut self) -> Self {
        self.force_start = true;
        self
    }

    pub fn prefetch_capacity(mut self, prefetch_capacity: u32) -> Self {
        self.prefetch_capacity = prefetch_capacity;
        self
    }

    pub fn partition(mut self, partition: u32) -> Self {
        self.partition = partition;
        self
    }

    /// Handler invoked for every event. Required.
    pub fn handler<H: EventHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(shared_handler(handler));
        self
    }

    /// Validates the builder and queues the open request.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when a required field is missing or the
    /// prefetch capacity is zero.
    pub fn open(self) -> Result<OpenFuture, Error> {
        let (acquisition, spec, handler) = self.into_parts()?;
        Ok(acquisition.open(spec, with_handler(handler)?))
    }

    fn into_parts(self) -> Result<Parts, Error> {
        non_empty(&self.topic, "Topic")?;
        let name = required(&self.name, "Subscription name")?.to_owned();
        if self.prefetch_capacity == 0 {
            return Err(Error::InvalidArgument(
                "Prefetch capacity must be positive.".to_owned(),
            ));
        }

        let spec = SubscriptionSpec {
            topic: self.topic,
            partition_id: self.partition,
            capacity: self.prefetch_capacity,
            params: SubscriptionParams::Topic {
                name,
                start_position: self.start_position,
                force_start: self.force_start,
            },
        };
        Ok((self.acquisition, spec, self.handler))
    }
}

/// Builds a task subscription drained by the user.
pub struct PollableTaskSubscriptionBuilder(TaskSubscriptionBuilder);

impl PollableTaskSubscriptionBuilder {
    pub(crate) fn new(
        acquisition: AcquisitionHandle,
        topic: &str,
        config: &ClientConfig,
    ) -> Self {
        PollableTaskSubscriptionBuilder(TaskSubscriptionBuilder::new(
            acquisition,
            topic,
            config,
        ))
    }

    /// Type of the tasks to lock. Required.
    pub fn task_type(self, task_type: &str) -> Self {
        PollableTaskSubscriptionBuilder(self.0.task_type(task_type))
    }

    pub fn lock_time(self, lock_time: Duration) -> Self {
        PollableTaskSubscriptionBuilder(self.0.lock_time(lock_time))
    }

    pub fn lock_owner(self, lock_owner: &str) -> Self {
        PollableTaskSubscriptionBuilder(self.0.lock_owner(lock_owner))
    }

    pub fn task_fetch_size(self, task_fetch_size: u32) -> Self {
        PollableTaskSubscriptionBuilder(self.0.task_fetch_size(task_fetch_size))
    }

    pub fn partition(self, partition: u32) -> Self {
        PollableTaskSubscriptionBuilder(self.0.partition(partition))
    }

    /// Validates the builder and queues the open request.
    ///
    /// # Errors
    ///
    /// Same as [`TaskSubscriptionBuilder::open`], a handler aside.
    pub fn open(self) -> Result<OpenFuture, Error> {
        let (acquisition, spec, _) = self.0.into_parts()?;
        Ok(acquisition.open_pollable(spec))
    }
}

/// Builds a topic subscription drained by the user.
pub struct PollableTopicSubscriptionBuilder(TopicSubscriptionBuilder);

impl PollableTopicSubscriptionBuilder {
    pub(crate) fn new(
        acquisition: AcquisitionHandle,
        topic: &str,
        config: &ClientConfig,
    ) -> Self {
        PollableTopicSubscriptionBuilder(TopicSubscriptionBuilder::new(
            acquisition,
            topic,
            config,
        ))
    }

    /// Name under which the broker tracks the subscription. Required.
    pub fn name(self, name: &str) -> Self {
        PollableTopicSubscriptionBuilder(self.0.name(name))
    }

    pub fn start_at_head(self) -> Self {
        PollableTopicSubscriptionBuilder(self.0.start_at_head())
    }

    pub fn start_at_tail(self) -> Self {
        PollableTopicSubscriptionBuilder(self.0.start_at_tail())
    }

    pub fn start_at_position(self, position: u64) -> Self {
        PollableTopicSubscriptionBuilder(self.0.start_at_position(position))
    }

    pub fn force_start(self) -> Self {
        PollableTopicSubscriptionBuilder(self.0.force_start())
    }

    pub fn prefetch_capacity(self, prefetch_capacity: u32) -> Self {
        PollableTopicSubscriptionBuilder(self.0.prefetch_capacity(prefetch_capacity))
    }

    pub fn partition(self, partition: u32) -> Self {
        PollableTopicSubscriptionBuilder(self.0.partition(partition))
    }

    /// Validates the builder and queues the open request.
    ///
    /// # Errors
    ///
    /// Same as [`TopicSubscriptionBuilder::open`], a handler aside.
    pub fn open(self) -> Result<OpenFuture, Error> {
        let (acquisition, spec, _) = self.0.into_parts()?;
        Ok(acquisition.open_pollable(spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        protocol::{SubscribedEvent, SubscriptionType},
        subscription::{EventAcquisition, EventSubscriptions},
        topology::SharedTopology,
    };

    use actor::SystemClock;
    use transport::MemoryOutput;

    use std::sync::Arc;

    fn handle(subscription_type: SubscriptionType) -> AcquisitionHandle {
        EventAcquisition::new(
            subscription_type,
            Arc::new(EventSubscriptions::new()),
            Arc::new(MemoryOutput::new()),
            Arc::new(SharedTopology::default()),
            Arc::new(SystemClock),
            Duration::from_secs(1),
        )
        .1
    }

    fn noop(_: &SubscribedEvent) -> Result<(), Error> {
        Ok(())
    }

    fn invalid(result: Result<OpenFuture, Error>) -> String {
        match result {
            Err(Error::InvalidArgument(message)) => message,
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("builder accepted invalid input"),
        }
    }

    #[test]
    fn test_task_builder_validation() {
        let config = ClientConfig::default();
        let builder =
            || TaskSubscriptionBuilder::new(handle(SubscriptionType::Task), "orders", &config);

        assert_eq!(
            invalid(builder().handler(noop).open()),
            "Task type must be set."
        );
        assert_eq!(
            invalid(builder().task_type("ship").open()),
            "Handler must be set."
        );
        assert_eq!(
            invalid(builder().task_type("ship").lock_owner("").handler(noop).open()),
            "Lock owner must not be empty."
        );
        assert_eq!(
            invalid(
                builder()
                    .task_type("ship")
                    .lock_time(Duration::ZERO)
                    .handler(noop)
                    .open()
            ),
            "Lock time must be positive."
        );
        assert!(
            builder()
                .task_type("ship")
                .task_fetch_size(4)
                .handler(noop)
                .open()
                .is_ok()
        );
    }

    #[test]
    fn test_topic_builder_validation() {
        let config = ClientConfig::default();
        let builder =
            || TopicSubscriptionBuilder::new(handle(SubscriptionType::Topic), "orders", &config);

        assert_eq!(
            invalid(builder().handler(noop).open()),
            "Subscription name must be set."
        );
        assert_eq!(
            invalid(builder().name("audit").prefetch_capacity(0).handler(noop).open()),
            "Prefetch capacity must be positive."
        );
        assert_eq!(
            invalid(
                TopicSubscriptionBuilder::new(handle(SubscriptionType::Topic), "", &config)
                    .name("audit")
                    .handler(noop)
                    .open()
            ),
            "Topic must not be empty."
        );
        assert!(
            builder()
                .name("audit")
                .start_at_head()
                .force_start()
                .handler(noop)
                .open()
                .is_ok()
        );
    }

    #[test]
    fn test_pollable_builders_need_no_handler() {
        let config = ClientConfig::default();
        assert_eq!(
            invalid(
                PollableTaskSubscriptionBuilder::new(
                    handle(SubscriptionType::Task),
                    "orders",
                    &config
                )
                .open()
            ),
            "Task type must be set."
        );
        assert!(
            PollableTaskSubscriptionBuilder::new(
                handle(SubscriptionType::Task),
                "orders",
                &config
            )
            .task_type("ship")
            .open()
            .is_ok()
        );
        assert_eq!(
            invalid(
                PollableTopicSubscriptionBuilder::new(
                    handle(SubscriptionType::Topic),
                    "orders",
                    &config
                )
                .name("audit")
                .prefetch_capacity(0)
                .open()
            ),
            "Prefetch capacity must be positive."
        );
        assert!(
            PollableTopicSubscriptionBuilder::new(
                handle(SubscriptionType::Topic),
                "orders",
                &config
            )
            .name("audit")
            .start_at_tail()
            .open()
            .is_ok()
        );
    }
}
