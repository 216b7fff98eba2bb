// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integration tests for the scheduler and state machines running on it.

use actor::{
    Actor, ActorScheduler, Error, FnActor, Idle, IdleStrategyConfig,
    MachineContext, State, StateContext, StateMachine, TRANSITION_DEFAULT,
};

use parking_lot::Mutex;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

fn scheduler(threads: usize) -> ActorScheduler {
    ActorScheduler::builder()
        .name("test")
        .thread_count(threads)
        .idle_strategy(IdleStrategyConfig::default())
        .build()
        .unwrap()
}

fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

// Request/response round trip driven by a flag another thread sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Exchange {
    Idle,
    Send,
    Await,
}

const TRANSITION_RECEIVED: u32 = 1;

struct ExchangeContext {
    response: Arc<AtomicBool>,
    sent: Arc<AtomicUsize>,
    received: Arc<AtomicUsize>,
}

impl MachineContext for ExchangeContext {
    fn reset(&mut self) {
        self.response.store(false, Ordering::SeqCst);
    }
}

struct SendRequest;

impl State<ExchangeContext> for SendRequest {
    fn work(&mut self, ctx: &mut StateContext<ExchangeContext>) -> Result<usize, Error> {
        ctx.sent.fetch_add(1, Ordering::SeqCst);
        ctx.take(TRANSITION_DEFAULT);
        Ok(1)
    }
}

struct AwaitResponse;

impl State<ExchangeContext> for AwaitResponse {
    fn work(&mut self, ctx: &mut StateContext<ExchangeContext>) -> Result<usize, Error> {
        if !ctx.response.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }
        ctx.received.fetch_add(1, Ordering::SeqCst);
        ctx.take(TRANSITION_RECEIVED);
        Ok(1)
    }
}

#[test]
fn test_state_machine_on_scheduler() {
    let scheduler = scheduler(2);
    let response = Arc::new(AtomicBool::new(false));
    let sent = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(AtomicUsize::new(0));

    let context = ExchangeContext {
        response: response.clone(),
        sent: sent.clone(),
        received: received.clone(),
    };
    let mut machine = StateMachine::builder(move || context)
        .name("exchange")
        .initial_state(Exchange::Idle)
        .wait_state(Exchange::Idle, Idle)
        .state(Exchange::Send, SendRequest)
        .state(Exchange::Await, AwaitResponse)
        .from(Exchange::Idle)
        .take(TRANSITION_DEFAULT)
        .to(Exchange::Send)
        .from(Exchange::Send)
        .take(TRANSITION_DEFAULT)
        .to(Exchange::Await)
        .from(Exchange::Await)
        .take(TRANSITION_RECEIVED)
        .to(Exchange::Idle)
        .build()
        .unwrap();
    machine.take(TRANSITION_DEFAULT).unwrap();
    assert_eq!(machine.current_state(), Exchange::Send);

    let reference = scheduler.schedule(machine).unwrap();

    assert!(eventually(|| sent.load(Ordering::SeqCst) == 1));
    assert_eq!(received.load(Ordering::SeqCst), 0);
    response.store(true, Ordering::SeqCst);
    assert!(eventually(|| received.load(Ordering::SeqCst) == 1));

    reference.close();
    assert!(reference.is_closed());
    scheduler.close();
}

#[test]
fn test_actors_spread_over_runners() {
    let scheduler = scheduler(2);
    let threads = Arc::new(Mutex::new(Vec::new()));
    let mut references = Vec::new();
    for index in 0..4 {
        let threads = threads.clone();
        let mut recorded = false;
        references.push(
            scheduler
                .schedule(FnActor::new(&format!("recorder-{}", index), move || {
                    if !recorded {
                        threads.lock().push(thread::current().id());
                        recorded = true;
                    }
                    Ok(0)
                }))
                .unwrap(),
        );
    }

    assert!(eventually(|| threads.lock().len() == 4));
    let mut distinct = threads.lock().clone();
    distinct.sort_by_key(|id| format!("{:?}", id));
    distinct.dedup();
    assert_eq!(distinct.len(), scheduler.thread_count());

    for reference in references.iter() {
        reference.close();
    }
    assert_eq!(scheduler.actor_count(), 0);
}

#[test]
fn test_failing_actor_keeps_running() {
    let failures = Arc::new(AtomicUsize::new(0));
    let failures_clone = failures.clone();
    let scheduler = ActorScheduler::builder()
        .name("failing")
        .thread_count(1)
        .idle_strategy(IdleStrategyConfig::BusySpin)
        .error_handler(move |_, _| {
            failures_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    let healthy = Arc::new(AtomicUsize::new(0));
    let healthy_clone = healthy.clone();

    scheduler
        .schedule(FnActor::new("panicking", || panic!("broken slice")))
        .unwrap();
    scheduler
        .schedule(FnActor::new("healthy", move || {
            healthy_clone.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }))
        .unwrap();

    assert!(eventually(|| failures.load(Ordering::SeqCst) >= 3));
    assert!(eventually(|| healthy.load(Ordering::SeqCst) >= 3));
    scheduler.close();
}

#[test]
fn test_closed_scheduler_rejects_actors() {
    let scheduler = scheduler(1);
    scheduler.close();
    scheduler.close();
    assert!(scheduler.is_closed());

    struct Never;

    impl Actor for Never {
        fn do_work(&mut self) -> Result<usize, Error> {
            Ok(0)
        }
    }

    assert_eq!(
        scheduler.schedule(Never).err(),
        Some(Error::SchedulerClosed("test".to_owned()))
    );
}
