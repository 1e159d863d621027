//! Capability traits consumed by the core
//!
//! Every piece of I/O the update engine and the supervisor depend on sits
//! behind one of these traits so it can be replaced in tests.
//!
//! - [`IpResolver`]: look up the caller's public IPv4 address
//! - [`UpdateTransport`]: deliver one update request to the DNS provider
//! - [`ProcessControl`]: probe and signal processes by identifier
//! - [`WorkerLauncher`]: spawn the worker process

pub mod ip_resolver;
pub mod transport;
pub mod process;

pub use ip_resolver::IpResolver;
pub use transport::{UpdateRequest, UpdateTransport};
pub use process::{Pid, ProcessControl, SpawnMode, WorkerHandle, WorkerLauncher};
