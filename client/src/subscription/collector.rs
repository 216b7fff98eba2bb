// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event collector
//!
//! Actor polling inbound frames, decoding pushed events and handing each to
//! the acquisition of its class.
//!

use actor::{Actor, ActorPriority, Error as ActorError};
use transport::{
    InboundMessages, SUBSCRIBED_EVENT_TEMPLATE, decode_message, split_message,
};

use crate::{
    protocol::{SubscribedEvent, SubscriptionType},
    subscription::AcquisitionHandle,
};

use tracing::warn;

pub(crate) struct EventCollector {
    inbound: Box<dyn InboundMessages>,
    task: AcquisitionHandle,
    topic: AcquisitionHandle,
}

impl EventCollector {
    pub(crate) fn new(
        inbound: Box<dyn InboundMessages>,
        task: AcquisitionHandle,
        topic: AcquisitionHandle,
    ) -> Self {
        EventCollector {
            inbound,
            task,
            topic,
        }
    }
}

fn dispatch(task: &AcquisitionHandle, topic: &AcquisitionHandle, frame: &[u8]) {
    let header = match split_message(frame) {
        Ok((header, _)) => header,
        Err(e) => {
            warn!("Skipping unreadable frame: {}", e);
            return;
        }
    };
    if !header.is(SUBSCRIBED_EVENT_TEMPLATE) {
        warn!(
            "Skipping frame with unknown template {} of schema {}.",
            header.template_id, header.schema_id
        );
        return;
    }
    match decode_message::<SubscribedEvent>(frame, SUBSCRIBED_EVENT_TEMPLATE) {
        Ok(event) => {
            match event.subscription_type {
                SubscriptionType::Task => task.on_event(event),
                SubscriptionType::Topic => topic.on_event(event),
            };
        }
        Err(e) => warn!("Skipping malformed event: {}", e),
    }
}

impl Actor for EventCollector {
    fn do_work(&mut self) -> Result<usize, ActorError> {
        let (task, topic) = (&self.task, &self.topic);
        Ok(self
            .inbound
            .poll(&mut |frame| dispatch(task, topic, frame)))
    }

    fn name(&self) -> &str {
        "event-collector"
    }

    fn priority(&self) -> ActorPriority {
        ActorPriority::High
    }
}
