// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Topology manager
//!
//! Actor keeping a [`SharedTopology`] up to date. Refreshes are requested
//! through a [`TopologyHandle`]; requests arriving while a refresh is in
//! flight join it. Every successful refresh replaces the shared snapshot.
//!

use actor::{Actor, Clock, Error as ActorError};
use transport::{ClientOutput, RemoteAddress, RequestError};

use crate::{
    Error,
    topology::{SharedTopology, TopologyController, TopologySnapshot, TopologyView},
};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

type RefreshResult = Result<Arc<TopologySnapshot>, RequestError>;
type RefreshReply = oneshot::Sender<RefreshResult>;

/// Requests refreshes from a [`TopologyManager`].
#[derive(Debug, Clone)]
pub struct TopologyHandle {
    sender: mpsc::UnboundedSender<Option<RefreshReply>>,
}

impl TopologyHandle {
    /// Asks for a refresh without waiting for it.
    ///
    /// # Returns
    ///
    /// `false` when the manager is gone.
    pub fn request_refresh(&self) -> bool {
        self.sender.send(None).is_ok()
    }

    /// Asks for a refresh and returns its pending outcome.
    pub fn refresh(&self) -> TopologyRefresh {
        let (reply, receiver) = oneshot::channel();
        // A dropped manager drops the reply, which resolves to `Closed`.
        let _ = self.sender.send(Some(reply));
        TopologyRefresh { receiver }
    }
}

/// Pending outcome of a refresh.
pub struct TopologyRefresh {
    receiver: oneshot::Receiver<RefreshResult>,
}

impl TopologyRefresh {
    /// Blocks until the refresh completes. Not for use in async code.
    pub fn wait(self) -> Result<Arc<TopologySnapshot>, Error> {
        match self.receiver.blocking_recv() {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Closed),
        }
    }

    /// The outcome, if the refresh already completed.
    pub fn try_result(&mut self) -> Option<Result<Arc<TopologySnapshot>, Error>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result.map_err(Error::from)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Closed)),
        }
    }
}

impl Future for TopologyRefresh {
    type Output = Result<Arc<TopologySnapshot>, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| match received {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::Closed),
        })
    }
}

/// Actor refreshing the shared topology on demand.
pub struct TopologyManager {
    controller: TopologyController,
    commands: mpsc::UnboundedReceiver<Option<RefreshReply>>,
    waiters: Arc<Mutex<Vec<RefreshReply>>>,
    topology: SharedTopology,
    contact_point: RemoteAddress,
    next_broker: usize,
}

impl TopologyManager {
    /// Creates the manager and the handle used to drive it.
    ///
    /// The first refresh goes to `contact_point`. Later ones rotate over the
    /// brokers of the current snapshot.
    pub fn new(
        contact_point: RemoteAddress,
        topology: SharedTopology,
        output: Arc<dyn ClientOutput>,
        clock: Arc<dyn Clock>,
        request_timeout: Duration,
    ) -> Result<(Self, TopologyHandle), Error> {
        let waiters: Arc<Mutex<Vec<RefreshReply>>> = Arc::new(Mutex::new(Vec::new()));
        let controller = {
            let topology = topology.clone();
            let waiters = waiters.clone();
            TopologyController::new(output, clock, request_timeout, move |outcome| {
                let outcome = outcome.map(|snapshot| topology.update(snapshot));
                for waiter in waiters.lock().drain(..) {
                    let _ = waiter.send(outcome.clone());
                }
            })?
        };
        let (sender, commands) = mpsc::unbounded_channel();
        Ok((
            TopologyManager {
                controller,
                commands,
                waiters,
                topology,
                contact_point,
                next_broker: 0,
            },
            TopologyHandle { sender },
        ))
    }

    pub fn topology(&self) -> &SharedTopology {
        &self.topology
    }

    fn next_remote(&mut self) -> RemoteAddress {
        let snapshot = self.topology.snapshot();
        let brokers: Vec<&RemoteAddress> = snapshot.brokers().into_iter().collect();
        if brokers.is_empty() {
            return self.contact_point.clone();
        }
        let remote = brokers[self.next_broker % brokers.len()].clone();
        self.next_broker = self.next_broker.wrapping_add(1);
        remote
    }
}

impl Actor for TopologyManager {
    fn do_work(&mut self) -> Result<usize, ActorError> {
        let mut requested = 0;
        while let Ok(reply) = self.commands.try_recv() {
            requested += 1;
            if let Some(reply) = reply {
                self.waiters.lock().push(reply);
            }
        }

        if requested > 0 && !self.controller.is_request_in_progress() {
            let remote = self.next_remote();
            debug!("{} refresh requests, asking {}.", requested, remote);
            self.controller
                .trigger_refresh(remote)
                .map_err(|e| ActorError::Functional(e.to_string()))?;
        }

        Ok(requested + self.controller.do_work()?)
    }

    fn name(&self) -> &str {
        "topology-manager"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use actor::ManualClock;
    use transport::{MemoryOutput, TOPOLOGY_RESPONSE_TEMPLATE, encode_message};

    fn broker(port: u16) -> RemoteAddress {
        RemoteAddress::new("broker", port)
    }

    fn manager() -> (TopologyManager, TopologyHandle, MemoryOutput, ManualClock) {
        let output = MemoryOutput::new();
        let clock = ManualClock::new();
        let (manager, handle) = TopologyManager::new(
            broker(1),
            SharedTopology::default(),
            Arc::new(output.clone()),
            Arc::new(clock.clone()),
            Duration::from_secs(1),
        )
        .unwrap();
        (manager, handle, output, clock)
    }

    #[test]
    fn test_refresh_publishes_snapshot() {
        let (mut manager, handle, output, _clock) = manager();
        let first = handle.refresh();
        let second = handle.refresh();
        assert!(handle.request_refresh());

        manager.do_work().unwrap();
        // Three refresh requests, one broker request.
        assert_eq!(output.requests().len(), 1);
        let request = output.last_request().unwrap();
        assert_eq!(request.remote(), &broker(1));

        let snapshot = TopologySnapshot::new()
            .with_leader("orders", 0, broker(2))
            .with_leader("orders", 1, broker(3));
        request.respond(
            encode_message(TOPOLOGY_RESPONSE_TEMPLATE, &snapshot).unwrap(),
        );
        manager.do_work().unwrap();

        assert_eq!(*first.wait().unwrap(), snapshot);
        assert_eq!(*second.wait().unwrap(), snapshot);
        assert_eq!(manager.topology().leader("orders", 1), Some(broker(3)));

        // Later refreshes go to the known brokers.
        handle.request_refresh();
        manager.do_work().unwrap();
        assert_eq!(output.last_request().unwrap().remote(), &broker(2));
    }

    #[test]
    fn test_failed_refresh_reaches_waiters() {
        let (mut manager, handle, output, clock) = manager();
        let refresh = handle.refresh();
        manager.do_work().unwrap();

        clock.advance(Duration::from_secs(2));
        manager.do_work().unwrap();

        assert_eq!(
            refresh.wait(),
            Err(Error::Request(RequestError::Timeout(Duration::from_secs(1))))
        );
        assert!(manager.topology().snapshot().is_empty());
        assert!(output.last_request().unwrap().is_closed());
    }

    #[test]
    fn test_try_result_before_and_after_completion() {
        let (mut manager, handle, output, _clock) = manager();
        let mut refresh = handle.refresh();
        assert!(refresh.try_result().is_none());

        manager.do_work().unwrap();
        assert!(refresh.try_result().is_none());
        output.last_request().unwrap().respond(
            encode_message(
                TOPOLOGY_RESPONSE_TEMPLATE,
                &TopologySnapshot::new().with_leader("orders", 0, broker(2)),
            )
            .unwrap(),
        );
        manager.do_work().unwrap();

        let snapshot = refresh.try_result().unwrap().unwrap();
        assert_eq!(snapshot.leader("orders", 0), Some(&broker(2)));
    }

    #[test]
    fn test_dropped_manager_closes_refresh() {
        let (manager, handle, _output, _clock) = manager();
        drop(manager);
        assert!(!handle.request_refresh());
        assert_eq!(handle.refresh().wait(), Err(Error::Closed));
    }
}
