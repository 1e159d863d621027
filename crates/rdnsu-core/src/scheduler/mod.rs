//! Scheduler loop
//!
//! Drives the [`UpdateEngine`] on a fixed interval: one cycle immediately,
//! then one per elapsed interval. Cycles never overlap. When a cycle overruns
//! the interval the next one starts as soon as it finishes and the schedule
//! is shifted from there (`MissedTickBehavior::Delay`), so missed ticks are
//! never replayed in a burst.
//!
//! [`Scheduler::run_locked`] is the worker's whole lifetime: it claims the
//! [`InstanceLock`], runs the loop and releases the lock however the loop
//! ended.

use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::engine::UpdateEngine;
use crate::error::{Error, Result};
use crate::lock::InstanceLock;

/// Fixed-interval driver for the update engine
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    /// Create a scheduler running one cycle per `interval`
    pub fn new(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::config("Update interval must be > 0"));
        }
        Ok(Self { interval })
    }

    /// Interval between cycles
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until `shutdown` resolves or a cycle fails fatally
    ///
    /// A cycle already in flight when `shutdown` resolves is allowed to
    /// finish first.
    ///
    /// # Returns
    ///
    /// - `Ok(cycles)`: clean shutdown after `cycles` completed cycles
    /// - `Err(Error)`: the fatal error of the failing cycle
    pub async fn run<F>(&self, engine: &mut UpdateEngine, shutdown: F) -> Result<u64>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Scheduler started (interval {:?})", self.interval);
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler after {} cycle(s)", cycles);
                    return Ok(cycles);
                }

                _ = ticker.tick() => {
                    match engine.update().await {
                        Ok(outcome) => {
                            cycles += 1;
                            debug!("Cycle {} finished: {:?}", cycles, outcome);
                        }
                        Err(e) => {
                            error!("The following error has occurred while trying to update: {}", e);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Claim `lock`, run until shutdown or a fatal error, then release it
    ///
    /// # Returns
    ///
    /// - `Ok(None)`: another live process owns the lock; no cycle ran
    /// - `Ok(Some(cycles))`: clean shutdown after `cycles` completed cycles
    /// - `Err(Error)`: the lock could not be claimed, or a cycle failed
    ///   fatally (the lock has been released)
    pub async fn run_locked<F>(
        &self,
        lock: &InstanceLock,
        engine: &mut UpdateEngine,
        shutdown: F,
    ) -> Result<Option<u64>>
    where
        F: Future<Output = ()>,
    {
        if !lock.lock()? {
            info!("Application is already running.");
            return Ok(None);
        }

        let result = self.run(engine, shutdown).await;

        if let Err(e) = lock.unlock() {
            error!("Failed to release instance lock: {}", e);
        }

        result.map(Some)
    }
}
