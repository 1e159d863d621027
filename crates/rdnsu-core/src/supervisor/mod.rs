//! Process supervisor
//!
//! Starts, stops and restarts the worker process from a short-lived control
//! process. The supervisor keeps no memory between invocations: liveness is
//! always read back from the [`InstanceLock`], never from a child handle.
//!
//! ## Operations
//!
//! - **start**: spawn a detached worker unless a live owner exists, then poll
//!   the lock until the worker has claimed it
//! - **stop**: interrupt the live owner and poll until it has exited
//! - **restart**: stop, then start if the stop succeeded
//! - **foreground**: run the worker attached to the current terminal

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::lock::InstanceLock;
use crate::traits::{Pid, ProcessControl, SpawnMode, WorkerLauncher};

/// Bounded polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before each attempt
    pub interval: Duration,
    /// Number of attempts before giving up
    pub attempts: u32,
}

impl PollPolicy {
    /// Startup confirmation: every 500ms, 10 attempts
    pub const START: PollPolicy = PollPolicy {
        interval: Duration::from_millis(500),
        attempts: 10,
    };

    /// Shutdown confirmation: every second, 10 attempts
    pub const STOP: PollPolicy = PollPolicy {
        interval: Duration::from_secs(1),
        attempts: 10,
    };
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A live worker already owned the lock; nothing was spawned
    AlreadyRunning { pid: Pid },
    /// The spawned worker claimed the lock
    Started { pid: Pid },
    /// A worker was spawned but never claimed the lock in time
    NotConfirmed,
}

/// Stateless worker supervisor
pub struct Supervisor {
    lock: InstanceLock,
    processes: Arc<dyn ProcessControl>,
    launcher: Box<dyn WorkerLauncher>,
    start_poll: PollPolicy,
    stop_poll: PollPolicy,
}

impl Supervisor {
    /// Create a supervisor with the default polling schedules
    pub fn new(
        lock: InstanceLock,
        processes: Arc<dyn ProcessControl>,
        launcher: Box<dyn WorkerLauncher>,
    ) -> Self {
        Self {
            lock,
            processes,
            launcher,
            start_poll: PollPolicy::START,
            stop_poll: PollPolicy::STOP,
        }
    }

    /// Override the polling schedules
    pub fn with_polling(mut self, start: PollPolicy, stop: PollPolicy) -> Self {
        self.start_poll = start;
        self.stop_poll = stop;
        self
    }

    /// Instance lock consulted by this supervisor
    pub fn lock(&self) -> &InstanceLock {
        &self.lock
    }

    /// Start a detached worker unless one is already running
    pub async fn start(&self) -> Result<StartOutcome> {
        if let Some(pid) = self.lock.live_owner()? {
            info!("Remote DNS Updater is already running (pid {}).", pid);
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        let handle = self.launcher.launch(SpawnMode::Detached).await?;
        debug!("Detached worker spawned: {:?}", handle);

        for attempt in 1..=self.start_poll.attempts {
            tokio::time::sleep(self.start_poll.interval).await;

            if let Some(pid) = self.lock.live_owner()? {
                info!("Application has started successfully (pid {}).", pid);
                return Ok(StartOutcome::Started { pid });
            }
            debug!("Worker not confirmed yet (attempt {})", attempt);
        }

        info!("Could not start application.");
        Ok(StartOutcome::NotConfirmed)
    }

    /// Stop the running worker
    ///
    /// Returns `true` when no worker is left running afterwards, `false`
    /// when nothing was running or the worker refused to exit in time.
    pub async fn stop(&self) -> Result<bool> {
        let Some(pid) = self.lock.owner_pid()? else {
            info!("The application is not running.");
            return Ok(false);
        };

        if !self.processes.is_alive(pid) {
            info!("Application has stopped (stale lock left by pid {}).", pid);
            return Ok(true);
        }

        if let Err(e) = self.processes.interrupt(pid) {
            if !self.processes.is_alive(pid) {
                info!("Application has stopped");
                return Ok(true);
            }
            warn!("Failed to stop the application: {}", e);
            return Ok(false);
        }

        for attempt in 1..=self.stop_poll.attempts {
            tokio::time::sleep(self.stop_poll.interval).await;

            if !self.processes.is_alive(pid) {
                info!("Application has stopped");
                return Ok(true);
            }
            debug!("Worker {} still alive (attempt {})", pid, attempt);
        }

        info!("Failed to stop the application.");
        Ok(false)
    }

    /// Stop the worker and start a new one
    ///
    /// Returns `None` when the stop did not succeed and nothing was started.
    pub async fn restart(&self) -> Result<Option<StartOutcome>> {
        if self.stop().await? {
            Ok(Some(self.start().await?))
        } else {
            Ok(None)
        }
    }

    /// Run the worker attached to the current terminal and wait for it
    ///
    /// Returns the worker's exit code, or `None` when it was killed by a
    /// signal.
    pub async fn foreground(&self) -> Result<Option<i32>> {
        let handle = self.launcher.launch(SpawnMode::Attached).await?;
        debug!("Foreground worker finished: {:?}", handle);
        Ok(handle.exit_code)
    }
}
