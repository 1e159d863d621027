//! Update engine
//!
//! The UpdateEngine runs one update cycle per call to [`UpdateEngine::update`]:
//!
//! ```text
//!            ┌────────────┐  resolve_v4   ┌────────────┐
//!  update ──▶│  Active    │──────────────▶│ IpResolver │
//!            └────────────┘               └────────────┘
//!              │ ip changed
//!              ▼
//!            ┌─────────────────┐  GET      ┌──────────┐
//!            │ UpdateTransport │──────────▶│ provider │
//!            └─────────────────┘           └──────────┘
//!              │ response code
//!              ▼
//!   good/nochg/911 ─▶ stay Active     suspension code/unknown ─▶ Suspended
//! ```
//!
//! While suspended no network call is made; every cycle only advances the
//! reminder counter. Suspension is left only by restarting the worker.

pub mod response;

use std::net::Ipv4Addr;
use tracing::{debug, error, info, warn};

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::traits::{IpResolver, UpdateRequest, UpdateTransport};

pub use response::{ProviderResponse, SUSPENSION_CODES, suspension_reason};

/// What a single cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Engine is suspended; the cycle was skipped
    SuspendedSkip,
    /// Engine is suspended; a reminder was emitted and the counter reset
    Reminded,
    /// Public IP lookup timed out; nothing changed
    ResolverTimedOut,
    /// Update request timed out; nothing changed
    TransportTimedOut,
    /// Public IP matches the last confirmed update
    UpToDate { ip: Ipv4Addr },
    /// Provider confirmed the update
    Updated { ip: Ipv4Addr },
    /// Provider reported that nothing needed changing
    NoChange { ip: Ipv4Addr },
    /// Provider reported a server-side problem (`911`)
    ProviderProblem,
    /// Provider answer suspended further updates
    Suspended { code: String, reason: String },
}

/// Mutable per-process state of the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Last address the provider confirmed with `good`
    pub current_ip: Option<Ipv4Addr>,
    /// Whether updates are suspended
    pub suspended: bool,
    /// Suspended cycles since the last reminder
    pub suspended_cycle_count: u32,
}

/// Immutable settings the engine needs from the configuration
#[derive(Clone)]
struct EngineSettings {
    base_url: String,
    dns_record: String,
    user: String,
    password: String,
    user_agent: String,
    remind: bool,
    remind_count: u32,
}

impl EngineSettings {
    fn from_config(config: &Configuration) -> Self {
        Self {
            base_url: format!(
                "{}://{}{}",
                config.protocol.scheme(),
                config.remote_hostname,
                config.path
            ),
            dns_record: config.dns_record.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            user_agent: crate::user_agent(),
            remind: config.remind_user_of_suspension,
            remind_count: config.remind_user_of_suspension_count,
        }
    }
}

/// Dynamic DNS update engine
///
/// Owns the session state exclusively. Construction performs no I/O.
pub struct UpdateEngine {
    settings: EngineSettings,
    resolver: Box<dyn IpResolver>,
    transport: Box<dyn UpdateTransport>,
    state: SessionState,
}

impl UpdateEngine {
    /// Create a new engine in the active state with no confirmed IP
    pub fn new(
        config: &Configuration,
        resolver: Box<dyn IpResolver>,
        transport: Box<dyn UpdateTransport>,
    ) -> Self {
        Self {
            settings: EngineSettings::from_config(config),
            resolver,
            transport,
            state: SessionState::default(),
        }
    }

    /// Current session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether updates are suspended
    pub fn is_suspended(&self) -> bool {
        self.state.suspended
    }

    /// Build the update request for `ip`
    pub fn request_for(&self, ip: Ipv4Addr) -> UpdateRequest {
        UpdateRequest {
            url: format!(
                "{}?hostname={}&myip={}",
                self.settings.base_url, self.settings.dns_record, ip
            ),
            user: self.settings.user.clone(),
            password: self.settings.password.clone(),
            user_agent: self.settings.user_agent.clone(),
        }
    }

    /// Run one update cycle
    ///
    /// # Returns
    ///
    /// - `Ok(CycleOutcome)`: the cycle finished, possibly as a no-op
    /// - `Err(Error)`: a fatal resolver or transport failure
    pub async fn update(&mut self) -> Result<CycleOutcome> {
        debug!("Initiating DNS update");

        if self.state.suspended {
            return Ok(self.suspended_cycle());
        }

        let ip = match self.resolver.resolve_v4().await {
            Ok(ip) => ip,
            Err(Error::ResolverTimeout(msg)) => {
                error!("Query timed out: {}", msg);
                return Ok(CycleOutcome::ResolverTimedOut);
            }
            Err(e) => return Err(e),
        };

        if self.state.current_ip == Some(ip) {
            info!("DNS is up to date ({})", ip);
            return Ok(CycleOutcome::UpToDate { ip });
        }

        let request = self.request_for(ip);
        let body = match self.transport.send(&request).await {
            Ok(body) => body,
            Err(Error::TransportTimeout(msg)) => {
                error!("Update request timed out: {}", msg);
                return Ok(CycleOutcome::TransportTimedOut);
            }
            Err(e) => return Err(e),
        };

        debug!("DNS response: {:?}", body);
        Ok(self.apply_response(ip, &body))
    }

    fn suspended_cycle(&mut self) -> CycleOutcome {
        debug!("DNS update is currently suspended. No update performed.");
        self.state.suspended_cycle_count += 1;

        if self.settings.remind && self.state.suspended_cycle_count >= self.settings.remind_count {
            warn!("Reminding you that DNS updating is still suspended.");
            self.state.suspended_cycle_count = 0;
            return CycleOutcome::Reminded;
        }

        CycleOutcome::SuspendedSkip
    }

    fn apply_response(&mut self, ip: Ipv4Addr, body: &str) -> CycleOutcome {
        match ProviderResponse::parse(body, ip) {
            ProviderResponse::ServerProblem => {
                info!("There's a problem with the DNS server.");
                CycleOutcome::ProviderProblem
            }
            ProviderResponse::Good => {
                info!("DNS record has successfully been updated to {}.", ip);
                self.state.current_ip = Some(ip);
                CycleOutcome::Updated { ip }
            }
            ProviderResponse::NoChange => {
                debug!("No changes have been made.");
                CycleOutcome::NoChange { ip }
            }
            ProviderResponse::Suspend(code) => {
                let reason = suspension_reason(&code);
                self.suspend(code, reason)
            }
            ProviderResponse::Unknown(raw) => self.suspend(raw, "Unknown response received"),
        }
    }

    fn suspend(&mut self, code: String, reason: &str) -> CycleOutcome {
        self.state.suspended = true;
        self.state.suspended_cycle_count = 0;

        warn!(
            "Update failed. DNS server returned \"{}\". {}. Suspending updates.",
            code, reason
        );

        CycleOutcome::Suspended {
            code,
            reason: reason.to_string(),
        }
    }
}
