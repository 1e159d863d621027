//! Configuration types for the Remote DNS Updater
//!
//! Configuration is assembled from layers. A [`ConfigLayer`] holds whatever a
//! single source supplied (the JSON file, the command line); layers are merged
//! with [`ConfigLayer::merge`] and turned into an immutable, validated
//! [`Configuration`] with [`Configuration::from_layer`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "RDNSU_CONFIG_DIR";

/// Environment variable overriding the configuration file name
pub const CONFIG_FILE_ENV: &str = "RDNSU_CONFIG_FILE";

/// Environment variable carrying the provider password to a worker
pub const PASSWORD_ENV: &str = "RDNSU_PASSWORD";

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_LOG_FILE: &str = "rdnsu.log";
const DEFAULT_UPDATE_INTERVAL_MINUTES: u64 = 10;
const DEFAULT_REMIND_COUNT: u32 = 15;
const MAX_CREDENTIAL_LEN: usize = 80;
const DEFAULT_SMTP_HOST: &str = "localhost";

/// Transport used to reach the DNS provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    /// URL scheme for this protocol
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(Error::config(format!(
                "Unexpected value \"{}\" for property \"protocol\". Valid: http, https",
                other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    #[serde(alias = "verbose")]
    Debug,
    #[serde(alias = "silly")]
    Trace,
}

impl FromStr for LoggingLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LoggingLevel::Error),
            "warn" => Ok(LoggingLevel::Warn),
            "info" => Ok(LoggingLevel::Info),
            "debug" | "verbose" => Ok(LoggingLevel::Debug),
            "trace" | "silly" => Ok(LoggingLevel::Trace),
            other => Err(Error::config(format!(
                "Unexpected value \"{}\" for property \"logging_level\". \
                Valid: error, warn, info, debug, trace",
                other
            ))),
        }
    }
}

impl From<LoggingLevel> for tracing::Level {
    fn from(level: LoggingLevel) -> Self {
        match level {
            LoggingLevel::Error => tracing::Level::ERROR,
            LoggingLevel::Warn => tracing::Level::WARN,
            LoggingLevel::Info => tracing::Level::INFO,
            LoggingLevel::Debug => tracing::Level::DEBUG,
            LoggingLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// SMTP delivery of log notifications
///
/// Keys follow the mail transport options of older `config.json` files;
/// options without a counterpart here are ignored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Recipient address
    pub to: String,

    /// Sender address [default: the recipient]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// [default: 465 with `ssl`, 587 with `tls`, 25 otherwise]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Implicit TLS; a certificate object counts as enabled
    #[serde(default, deserialize_with = "deserialize_ssl")]
    pub ssl: bool,

    /// STARTTLS
    #[serde(default)]
    pub tls: bool,

    /// Subject template; `{{level}}` and `{{msg}}` are substituted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Least severe level that is mailed [default: warn]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LoggingLevel>,
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("ssl", &self.ssl)
            .field("tls", &self.tls)
            .field("subject", &self.subject)
            .field("level", &self.level)
            .finish()
    }
}

impl EmailSettings {
    /// SMTP port, falling back to the conventional one for the TLS mode
    pub fn port(&self) -> u16 {
        match (self.port, self.ssl, self.tls) {
            (Some(port), _, _) => port,
            (None, true, _) => 465,
            (None, false, true) => 587,
            (None, false, false) => 25,
        }
    }

    /// Sender address
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.to)
    }

    /// Least severe level that is mailed
    pub fn level(&self) -> LoggingLevel {
        self.level.unwrap_or(LoggingLevel::Warn)
    }

    fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(Error::config("Configuration property \"email.to\" cannot be empty"));
        }
        if self.host.is_empty() {
            return Err(Error::config("Configuration property \"email.host\" cannot be empty"));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(Error::config(
                "Configuration properties \"email.username\" and \"email.password\" must be set together",
            ));
        }
        Ok(())
    }
}

fn default_smtp_host() -> String {
    DEFAULT_SMTP_HOST.to_string()
}

fn deserialize_ssl<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(false),
        serde_json::Value::Bool(enabled) => Ok(enabled),
        serde_json::Value::Object(_) => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean or certificate object for \"ssl\", found {}",
            other
        ))),
    }
}

/// Settings supplied by a single configuration source
///
/// Every field is optional; unknown keys are rejected so that typos in the
/// configuration file surface as errors instead of silently using defaults.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_record: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<EmailSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<LoggingLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Minutes between update cycles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u64>,

    #[serde(default, alias = "remind", skip_serializing_if = "Option::is_none")]
    pub remind_user_of_suspension: Option<bool>,

    #[serde(default, alias = "remind_count", skip_serializing_if = "Option::is_none")]
    pub remind_user_of_suspension_count: Option<u32>,
}

impl fmt::Debug for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLayer")
            .field("remote_hostname", &self.remote_hostname)
            .field("path", &self.path)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("dns_record", &self.dns_record)
            .field("protocol", &self.protocol)
            .field("email", &self.email)
            .field("logging_level", &self.logging_level)
            .field("log_file", &self.log_file)
            .field("update_interval", &self.update_interval)
            .field("remind_user_of_suspension", &self.remind_user_of_suspension)
            .field(
                "remind_user_of_suspension_count",
                &self.remind_user_of_suspension_count,
            )
            .finish()
    }
}

impl ConfigLayer {
    /// Load a layer from a JSON file
    ///
    /// A missing file yields an empty layer; any other read or parse failure
    /// is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No configuration file at {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::config(format!(
                    "Failed to read configuration file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse configuration file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Write this layer to a JSON file, replacing any previous content
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            Error::config(format!(
                "Failed to save configuration to {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Overlay `higher` on top of `self`; fields set in `higher` win
    pub fn merge(self, higher: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            remote_hostname: higher.remote_hostname.or(self.remote_hostname),
            path: higher.path.or(self.path),
            user: higher.user.or(self.user),
            password: higher.password.or(self.password),
            dns_record: higher.dns_record.or(self.dns_record),
            protocol: higher.protocol.or(self.protocol),
            email: higher.email.or(self.email),
            logging_level: higher.logging_level.or(self.logging_level),
            log_file: higher.log_file.or(self.log_file),
            update_interval: higher.update_interval.or(self.update_interval),
            remind_user_of_suspension: higher
                .remind_user_of_suspension
                .or(self.remind_user_of_suspension),
            remind_user_of_suspension_count: higher
                .remind_user_of_suspension_count
                .or(self.remind_user_of_suspension_count),
        }
    }
}

/// Validated, immutable updater configuration
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    pub remote_hostname: String,
    pub path: String,
    pub user: String,
    pub password: String,
    pub dns_record: String,
    pub protocol: Protocol,
    pub email: Option<EmailSettings>,
    pub logging_level: LoggingLevel,
    pub log_file: Option<PathBuf>,
    /// Minutes between update cycles
    pub update_interval: u64,
    pub remind_user_of_suspension: bool,
    pub remind_user_of_suspension_count: u32,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("remote_hostname", &self.remote_hostname)
            .field("path", &self.path)
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .field("dns_record", &self.dns_record)
            .field("protocol", &self.protocol)
            .field("email", &self.email)
            .field("logging_level", &self.logging_level)
            .field("log_file", &self.log_file)
            .field("update_interval", &self.update_interval)
            .field("remind_user_of_suspension", &self.remind_user_of_suspension)
            .field(
                "remind_user_of_suspension_count",
                &self.remind_user_of_suspension_count,
            )
            .finish()
    }
}

impl Configuration {
    /// Build a configuration from a merged layer
    ///
    /// Fails on the first missing required property, then applies defaults
    /// and validates every value.
    pub fn from_layer(layer: ConfigLayer) -> Result<Self> {
        let config = Self {
            remote_hostname: required(layer.remote_hostname, "remote_hostname")?,
            path: required(layer.path, "path")?,
            user: required(layer.user, "user")?,
            password: required(layer.password, "password")?,
            dns_record: required(layer.dns_record, "dns_record")?,
            protocol: layer.protocol.unwrap_or_default(),
            email: layer.email,
            logging_level: layer.logging_level.unwrap_or_default(),
            log_file: layer.log_file,
            update_interval: layer
                .update_interval
                .unwrap_or(DEFAULT_UPDATE_INTERVAL_MINUTES),
            remind_user_of_suspension: layer.remind_user_of_suspension.unwrap_or(true),
            remind_user_of_suspension_count: layer
                .remind_user_of_suspension_count
                .unwrap_or(DEFAULT_REMIND_COUNT),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("remote_hostname", &self.remote_hostname),
            ("path", &self.path),
            ("user", &self.user),
            ("password", &self.password),
            ("dns_record", &self.dns_record),
        ] {
            if value.is_empty() {
                return Err(Error::config(format!(
                    "Configuration property \"{}\" cannot be empty",
                    name
                )));
            }
        }

        for (name, value) in [("user", &self.user), ("password", &self.password)] {
            if value.chars().count() > MAX_CREDENTIAL_LEN {
                return Err(Error::config(format!(
                    "Configuration property \"{}\" exceeds {} characters",
                    name, MAX_CREDENTIAL_LEN
                )));
            }
        }

        if !self.path.starts_with('/') {
            return Err(Error::config(format!(
                "Unexpected value \"{}\" for property \"path\": must start with \"/\"",
                self.path
            )));
        }

        validate_dns_record(&self.dns_record)?;

        if let Some(email) = &self.email {
            email.validate()?;
        }

        if self.update_interval == 0 {
            return Err(Error::config("update_interval must be > 0 minutes"));
        }

        if self.remind_user_of_suspension_count == 0 {
            return Err(Error::config("remind_user_of_suspension_count must be > 0"));
        }

        Ok(())
    }

    /// Interval between scheduled update cycles
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.update_interval.saturating_mul(60))
    }

    /// Log file path, falling back to the configuration directory
    pub fn log_file_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| config_dir().join(DEFAULT_LOG_FILE))
    }
}

fn required(value: Option<String>, property: &str) -> Result<String> {
    value.ok_or_else(|| {
        Error::config(format!("Missing configuration property \"{}\"", property))
    })
}

/// Validate a dynamic DNS record: a fully qualified domain name with an
/// optional `/path` suffix.
///
/// Every label before the top-level one starts with a character that is
/// neither a digit nor a hyphen, is followed by 1 to 63 alphanumerics or inner
/// hyphens, and the top-level label has 2 to 5 word characters.
pub fn validate_dns_record(record: &str) -> Result<()> {
    let invalid = |why: &str| {
        Err(Error::config(format!(
            "Unexpected value \"{}\" for property \"dns_record\": {}",
            record, why
        )))
    };

    let (host, path) = match record.split_once('/') {
        Some((host, path)) => (host, Some(path)),
        None => (record, None),
    };

    if let Some(path) = path
        && path.split('/').any(|segment| segment.is_empty())
    {
        return invalid("path segments cannot be empty");
    }

    let labels: Vec<&str> = host.split('.').collect();
    let Some((tld, labels)) = labels.split_last() else {
        return invalid("missing top-level domain");
    };

    if labels.is_empty() {
        return invalid("not a fully qualified domain name");
    }

    if !(2..=5).contains(&tld.len())
        || !tld.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return invalid("top-level domain must be 2 to 5 word characters");
    }

    for label in labels {
        let mut chars = label.chars();
        let Some(first) = chars.next() else {
            return invalid("empty label");
        };
        if first == '-' || first.is_ascii_digit() {
            return invalid("labels cannot start with a digit or hyphen");
        }

        let rest = chars.as_str();
        if rest.is_empty() || rest.len() > 63 {
            return invalid("labels must be 2 to 64 characters long");
        }
        if rest.ends_with('-') || !rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return invalid("labels may only contain alphanumerics and inner hyphens");
        }
    }

    Ok(())
}

/// Directory holding the configuration file and default log file
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }

    default_config_dir()
}

#[cfg(windows)]
fn default_config_dir() -> PathBuf {
    std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("rdnsu")
}

#[cfg(not(windows))]
fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/rdnsu")
}

/// Resolve the configuration file path
///
/// An explicit path wins; otherwise the file name comes from
/// `RDNSU_CONFIG_FILE` (default `config.json`) inside [`config_dir`].
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let file = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    config_dir().join(file)
}
