// # rdnsu-core
//
// Core library for the Remote DNS Updater.
//
// ## Architecture Overview
//
// - **InstanceLock**: cross-process record naming the one legitimate worker
// - **UpdateEngine**: poll → compare → request → interpret-response, with
//   suspension and reminders
// - **Scheduler**: runs the engine once immediately, then on a fixed interval
// - **Supervisor**: start/stop/restart of the worker through the lock
//
// All network and process I/O is reached through the traits in [`traits`].

pub mod traits;
pub mod engine;
pub mod scheduler;
pub mod lock;
pub mod supervisor;
pub mod system;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{IpResolver, UpdateTransport, UpdateRequest, ProcessControl, WorkerLauncher};
pub use engine::{CycleOutcome, SessionState, UpdateEngine};
pub use scheduler::Scheduler;
pub use lock::InstanceLock;
pub use supervisor::{PollPolicy, StartOutcome, Supervisor};
pub use system::{SystemProcesses, WorkerCommand};
pub use config::{ConfigLayer, Configuration, EmailSettings, LoggingLevel, Protocol};
pub use error::{Error, Result};

/// Application name sent to the provider
pub const APP_NAME: &str = "Remote DNS Updater";

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `User-Agent` header value identifying this application
pub fn user_agent() -> String {
    format!("{}/{}", APP_NAME, VERSION)
}
