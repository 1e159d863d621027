//! Command line surface
//!
//! Every settings flag is global, so it may appear before or after the
//! subcommand. The supervisor forwards the parsed settings to the worker it
//! spawns via [`Settings::worker_args`].

use clap::{Args, Parser, Subcommand};
use rdnsu_core::config::{self, ConfigLayer};
use rdnsu_core::{Configuration, LoggingLevel, Protocol};
use std::ffi::OsString;
use std::path::PathBuf;

/// Remote DNS Updater: keeps a dynamic DNS record pointed at this host's
/// public IPv4 address
#[derive(Parser, Debug)]
#[command(name = "rdnsu", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub settings: Settings,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the updater in the background
    Start,
    /// Stop the background updater
    Stop,
    /// Restart the background updater
    Restart,
    /// Run the update loop in this process
    #[command(hide = true)]
    Worker,
}

// Settings flags shared by every command
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// Configuration file [default: $RDNSU_CONFIG_DIR/config.json]
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host name of the remote DNS service, e.g. "members.dyndns.org"
    #[arg(short = 'H', long = "remote-host", global = true, value_name = "HOST", help_heading = "Settings")]
    pub remote_hostname: Option<String>,

    /// Request path on the remote DNS service, e.g. "/nic/update"
    #[arg(short = 'A', long, global = true, help_heading = "Settings")]
    pub path: Option<String>,

    /// Remote DNS user name
    #[arg(short = 'u', long, global = true, help_heading = "Settings")]
    pub user: Option<String>,

    /// Remote DNS password
    #[arg(
        short = 'p',
        long,
        global = true,
        env = config::PASSWORD_ENV,
        hide_env_values = true,
        help_heading = "Settings"
    )]
    pub password: Option<String>,

    /// DNS record that points to this network
    #[arg(short = 'D', long = "dns-record", global = true, value_name = "RECORD", help_heading = "Settings")]
    pub dns_record: Option<String>,

    /// Protocol used to reach the remote DNS service [http, https]
    #[arg(short = 'P', long, global = true, help_heading = "Settings")]
    pub protocol: Option<Protocol>,

    /// Logging level [error, warn, info, debug, trace]
    #[arg(short = 'L', long = "logging-level", global = true, value_name = "LEVEL", help_heading = "Settings")]
    pub logging_level: Option<LoggingLevel>,

    /// Log file [default: $RDNSU_CONFIG_DIR/rdnsu.log]
    #[arg(long = "log-file", global = true, value_name = "FILE", help_heading = "Settings")]
    pub log_file: Option<PathBuf>,

    /// Minutes between IP checks [default: 10]
    #[arg(short = 'U', long = "update-interval", global = true, value_name = "MINUTES", help_heading = "Settings")]
    pub update_interval: Option<u64>,

    /// Remind about an active suspension
    #[arg(
        short = 'r',
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL",
        help_heading = "Settings"
    )]
    pub remind: Option<bool>,

    /// Skipped cycles between suspension reminders [default: 15]
    #[arg(short = 'R', long = "remind-count", global = true, value_name = "CYCLES", help_heading = "Settings")]
    pub remind_count: Option<u32>,

    /// Save the merged settings to the configuration file
    #[arg(short = 'S', long, global = true, help_heading = "Settings")]
    pub save: bool,

    /// Log at debug level or above
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

impl Settings {
    /// Settings given on the command line, as a configuration layer
    pub fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            remote_hostname: self.remote_hostname.clone(),
            path: self.path.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            dns_record: self.dns_record.clone(),
            protocol: self.protocol,
            email: None,
            logging_level: self.logging_level,
            log_file: self.log_file.clone(),
            update_interval: self.update_interval,
            remind_user_of_suspension: self.remind,
            remind_user_of_suspension_count: self.remind_count,
        }
    }

    /// Configuration file these settings refer to
    pub fn config_path(&self) -> PathBuf {
        config::config_file_path(self.config.as_deref())
    }

    /// Merge the configuration file with the command line and validate it
    ///
    /// With `--save` the merged settings are written back to the file first,
    /// so a saved file may still be incomplete.
    pub fn resolve(&self) -> rdnsu_core::Result<Configuration> {
        let path = self.config_path();
        let layer = ConfigLayer::load(&path)?.merge(self.layer());

        if self.save {
            layer.save(&path)?;
        }

        Configuration::from_layer(layer)
    }

    /// Log level for the console before any file has been read
    pub fn console_level(&self) -> LoggingLevel {
        effective_level(self.logging_level.unwrap_or_default(), self.verbose)
    }

    /// Arguments that reproduce these settings in a worker process
    ///
    /// `--save` is not forwarded: saving happens once, in the invoking
    /// process. The password travels in [`Settings::worker_env`].
    pub fn worker_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();

        if let Some(path) = &self.config {
            let mut arg = OsString::from("--config=");
            arg.push(path);
            args.push(arg);
        }

        let mut push = |flag: &str, value: Option<String>| {
            if let Some(value) = value {
                args.push(OsString::from(format!("--{}={}", flag, value)));
            }
        };

        push("remote-host", self.remote_hostname.clone());
        push("path", self.path.clone());
        push("user", self.user.clone());
        push("dns-record", self.dns_record.clone());
        push("protocol", self.protocol.map(|p| p.to_string()));
        push("logging-level", self.logging_level.map(level_name));
        push("update-interval", self.update_interval.map(|v| v.to_string()));
        push("remind", self.remind.map(|v| v.to_string()));
        push("remind-count", self.remind_count.map(|v| v.to_string()));

        if let Some(path) = &self.log_file {
            let mut arg = OsString::from("--log-file=");
            arg.push(path);
            args.push(arg);
        }

        if self.verbose {
            args.push(OsString::from("--verbose"));
        }

        args
    }

    /// Environment that completes [`Settings::worker_args`] in a worker
    pub fn worker_env(&self) -> Vec<(&'static str, String)> {
        self.password
            .iter()
            .map(|password| (config::PASSWORD_ENV, password.clone()))
            .collect()
    }
}

/// Raise `configured` to debug when `--verbose` is set
pub fn effective_level(configured: LoggingLevel, verbose: bool) -> LoggingLevel {
    if verbose {
        configured.max(LoggingLevel::Debug)
    } else {
        configured
    }
}

fn level_name(level: LoggingLevel) -> String {
    match level {
        LoggingLevel::Error => "error",
        LoggingLevel::Warn => "warn",
        LoggingLevel::Info => "info",
        LoggingLevel::Debug => "debug",
        LoggingLevel::Trace => "trace",
    }
    .to_string()
}
