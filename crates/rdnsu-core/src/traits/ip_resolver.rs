// # IP Resolver Trait
//
// Defines the interface for discovering the caller's public IPv4 address.
//
// ## Implementations
//
// - HTTP echo service: `rdnsu-ip-http` crate

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for public IP resolver implementations
///
/// A resolver performs exactly one lookup per call. It must not retry or
/// cache; the scheduler's next cycle is the only retry mechanism.
///
/// # Errors
///
/// - [`crate::Error::ResolverTimeout`] when the lookup did not answer in time.
///   The engine treats this as transient and skips the cycle.
/// - Any other error is fatal for the cycle.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public IPv4 address
    async fn resolve_v4(&self) -> Result<Ipv4Addr, crate::Error>;
}
