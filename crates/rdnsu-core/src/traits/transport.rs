// # Update Transport Trait
//
// Defines the interface for delivering a single update request to the remote
// dynamic DNS provider and returning its plain-text answer.
//
// ## Implementations
//
// - dyndns2-style HTTP(S) GET: `rdnsu-provider-dyndns` crate

use async_trait::async_trait;
use std::fmt;

/// A fully formed update request
///
/// The URL already carries the scheme, provider host, path and query string
/// (`?hostname={record}&myip={ip}`); the transport sends it verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Complete request URL
    pub url: String,
    /// HTTP Basic auth user
    pub user: String,
    /// HTTP Basic auth password
    /// ⚠️ NEVER log this value
    pub password: String,
    /// Value for the `User-Agent` header
    pub user_agent: String,
}

impl fmt::Debug for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateRequest")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Trait for update transport implementations
///
/// # Contract
///
/// - Exactly one GET per call, no internal retry
/// - Returns the fully buffered response body, whatever the HTTP status
/// - [`crate::Error::TransportTimeout`] when the request timed out
/// - [`crate::Error::Transport`] for connection and protocol failures
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    /// Send the request and return the response body
    async fn send(&self, request: &UpdateRequest) -> Result<String, crate::Error>;
}
