// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Idle strategies
//!
//! A runner consults its idle strategy after every pass over its actors. When
//! the pass produced no work the strategy decides how to wait; as soon as work
//! shows up again the strategy is reset.

use serde::{Deserialize, Serialize};

use std::{fmt::Debug, hint, thread, time::Duration};

/// Trait to define an IdleStrategy. You can use this trait to define your
/// custom idle strategy.
pub trait IdleStrategy: Debug + Send {
    /// Called after a pass that produced no work.
    fn idle(&mut self);

    /// Called after a pass that produced work.
    fn reset(&mut self);

    /// Dispatches to `idle` or `reset` depending on the work count of a pass.
    fn idle_for(&mut self, work_count: usize) {
        if work_count > 0 {
            self.reset();
        } else {
            self.idle();
        }
    }
}

/// Never backs off. Burns a core but gives the lowest wake-up latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinIdleStrategy;

impl IdleStrategy for BusySpinIdleStrategy {
    fn idle(&mut self) {
        hint::spin_loop();
    }

    fn reset(&mut self) {}
}

/// Current escalation level of a [`BackoffIdleStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IdleLevel {
    /// The last pass did work.
    NotIdle,
    /// Spinning with a CPU hint.
    Spinning,
    /// Yielding the thread to the OS scheduler.
    Yielding,
    /// Parking the thread for a growing period.
    Parking,
}

/// Spins, then yields, then parks with an exponentially growing period that
/// is capped at `max_park`.
#[derive(Debug, Clone)]
pub struct BackoffIdleStrategy {
    max_spins: u64,
    max_yields: u64,
    min_park: Duration,
    max_park: Duration,
    spins: u64,
    yields: u64,
    park_period: Duration,
    level: IdleLevel,
}

impl BackoffIdleStrategy {
    pub fn new(
        max_spins: u64,
        max_yields: u64,
        min_park: Duration,
        max_park: Duration,
    ) -> Self {
        let max_park = max_park.max(min_park);
        BackoffIdleStrategy {
            max_spins,
            max_yields,
            min_park,
            max_park,
            spins: 0,
            yields: 0,
            park_period: min_park,
            level: IdleLevel::NotIdle,
        }
    }

    pub fn level(&self) -> IdleLevel {
        self.level
    }

    /// Period the next `idle` call will park for, once parking.
    pub fn park_period(&self) -> Duration {
        self.park_period
    }

    /// True once the strategy parks for the maximum period on every idle call.
    pub fn is_saturated(&self) -> bool {
        self.level == IdleLevel::Parking && self.park_period == self.max_park
    }
}

impl IdleStrategy for BackoffIdleStrategy {
    fn idle(&mut self) {
        match self.level {
            IdleLevel::NotIdle => {
                self.level = IdleLevel::Spinning;
                self.spins += 1;
            }
            IdleLevel::Spinning => {
                hint::spin_loop();
                self.spins += 1;
                if self.spins > self.max_spins {
                    self.level = IdleLevel::Yielding;
                    self.yields = 0;
                }
            }
            IdleLevel::Yielding => {
                self.yields += 1;
                if self.yields > self.max_yields {
                    self.level = IdleLevel::Parking;
                    self.park_period = self.min_park;
                } else {
                    thread::yield_now();
                }
            }
            IdleLevel::Parking => {
                thread::park_timeout(self.park_period);
                self.park_period = (self.park_period * 2).min(self.max_park);
            }
        }
    }

    fn reset(&mut self) {
        self.spins = 0;
        self.yields = 0;
        self.park_period = self.min_park;
        self.level = IdleLevel::NotIdle;
    }
}

/// Serializable selection of an idle strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdleStrategyConfig {
    /// See [`BusySpinIdleStrategy`].
    BusySpin,
    /// See [`BackoffIdleStrategy`].
    Backoff {
        max_spins: u64,
        max_yields: u64,
        min_park_nanos: u64,
        max_idle_time_ms: u64,
    },
}

impl Default for IdleStrategyConfig {
    fn default() -> Self {
        IdleStrategyConfig::Backoff {
            max_spins: 10_000,
            max_yields: 10_000,
            min_park_nanos: 100,
            max_idle_time_ms: 10,
        }
    }
}

impl IdleStrategyConfig {
    /// Creates a fresh strategy instance. Every runner owns its own instance.
    pub fn build(&self) -> Box<dyn IdleStrategy> {
        match self {
            IdleStrategyConfig::BusySpin => Box::new(BusySpinIdleStrategy),
            IdleStrategyConfig::Backoff {
                max_spins,
                max_yields,
                min_park_nanos,
                max_idle_time_ms,
            } => Box::new(BackoffIdleStrategy::new(
                *max_spins,
                *max_yields,
                Duration::from_nanos(*min_park_nanos),
                Duration::from_millis(*max_idle_time_ms),
            )),
        }
    }
}
