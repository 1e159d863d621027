//! Provider response codes
//!
//! The provider answers every update with a short plain-text code. The table
//! is fixed; anything outside it is treated as [`ProviderResponse::Unknown`].

use std::net::Ipv4Addr;

/// Codes after which no further update is attempted
pub const SUSPENSION_CODES: &[&str] = &[
    "dnserr", "badagent", "abuse", "numhost", "nohost", "notfqdn", "badauth",
];

/// Interpreted provider answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// `good` or `good {ip}` for the IP that was sent
    Good,
    /// `nochg`
    NoChange,
    /// `911`, a problem on the provider side
    ServerProblem,
    /// One of [`SUSPENSION_CODES`]
    Suspend(String),
    /// Anything else, kept verbatim
    Unknown(String),
}

impl ProviderResponse {
    /// Classify a response body for an update that sent `sent_ip`
    ///
    /// Matching is exact on the whole body, so `good 1.2.3.4` only counts as
    /// success when `1.2.3.4` is the address that was sent, and padded codes
    /// such as `"nochg\n"` are unknown.
    pub fn parse(body: &str, sent_ip: Ipv4Addr) -> Self {
        match body {
            "911" => ProviderResponse::ServerProblem,
            "good" => ProviderResponse::Good,
            "nochg" => ProviderResponse::NoChange,
            c if SUSPENSION_CODES.contains(&c) => ProviderResponse::Suspend(c.to_string()),
            c if c.strip_prefix("good ") == Some(sent_ip.to_string().as_str()) => {
                ProviderResponse::Good
            }
            c => ProviderResponse::Unknown(c.to_string()),
        }
    }
}

/// Human-readable reason for a suspension code
pub fn suspension_reason(code: &str) -> &'static str {
    match code {
        "dnserr" => "DNS error encountered",
        "badagent" => "User agent not permitted or HTTP method is not permitted",
        "abuse" => "The hostname specified is blocked for update abuse",
        "numhost" => "Too many hostnames have been provided",
        "nohost" => "The specified hostname does not exist in the DNS records",
        "notfqdn" => "The hostname specified is not a fully qualified domain name",
        "badauth" => "Authentication with the DNS server failed",
        _ => "Unknown response received",
    }
}
