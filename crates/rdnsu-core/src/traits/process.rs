// # Process Traits
//
// Liveness probing, signalling and worker spawning, isolated from the
// operating system so the instance lock and the supervisor can be tested
// with fakes.
//
// ## Implementations
//
// - `crate::system::SystemProcesses`: zero-signal probe and SIGINT via `kill(2)`
// - `crate::system::WorkerCommand`: re-executes the current binary as worker

use async_trait::async_trait;

/// Operating system process identifier
pub type Pid = u32;

/// Trait for probing and signalling processes
pub trait ProcessControl: Send + Sync {
    /// Whether `pid` refers to a live process
    ///
    /// Only a definite "no such process" answer may yield `false`. Any
    /// indeterminate outcome (for example, permission denied) must be
    /// reported as alive so that a foreign owner is never reclaimed.
    fn is_alive(&self, pid: Pid) -> bool;

    /// Ask `pid` to shut down gracefully (SIGINT)
    fn interrupt(&self, pid: Pid) -> Result<(), crate::Error>;
}

/// How the worker process is attached to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    /// Worker outlives the caller; no shared stdio, not awaited
    Detached,
    /// Worker inherits stdio and the caller waits for it to exit
    Attached,
}

/// What is known about a spawned worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerHandle {
    /// Process identifier, when the platform reported one
    pub pid: Option<Pid>,
    /// Exit code; only set for attached workers
    pub exit_code: Option<i32>,
}

/// Trait for spawning the worker process
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Spawn the worker
    ///
    /// For [`SpawnMode::Attached`] this resolves once the worker has exited.
    async fn launch(&self, mode: SpawnMode) -> Result<WorkerHandle, crate::Error>;
}
