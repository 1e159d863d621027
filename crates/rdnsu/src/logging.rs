//! Log sinks
//!
//! The console always receives log lines. The worker additionally appends
//! plain-text lines to its log file, rotated by size, and mails notable
//! events when an `email` section is configured.

use crate::mail::{self, Mailer};
use rdnsu_core::{EmailSettings, LoggingLevel};
use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Size at which the log file is rotated
pub const LOG_FILE_MAX_SIZE: u64 = 512_000;

/// Rotated files kept next to the live one (`rdnsu.log.1`, `rdnsu.log.2`)
pub const LOG_FILE_BACKUPS: usize = 2;

/// State that must outlive logging
///
/// Dropping it flushes the file writer. The mailer, if any, still has to be
/// spawned on a runtime.
#[must_use]
pub struct LogHandles {
    _file_guard: Option<WorkerGuard>,
    pub mailer: Option<Mailer>,
}

/// Install the global subscriber
///
/// Failing to open the log file is not fatal: it is reported through the
/// console sink once that is installed. An unusable `email` section is.
pub fn init(
    level: LoggingLevel,
    log_file: Option<&Path>,
    email: Option<&EmailSettings>,
) -> anyhow::Result<LogHandles> {
    let (mail_layer, mailer) = match email {
        Some(settings) => {
            let (layer, mailer) = mail::channel(settings)?;
            (Some(layer), Some(mailer))
        }
        None => (None, None),
    };

    let mut file_error = None;
    let mut file_guard = None;

    let file_layer = match log_file.map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        Some(Err(e)) => {
            file_error = Some(e);
            None
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level.into()))
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .with(mail_layer)
        .try_init()?;

    if let (Some(path), Some(e)) = (log_file, file_error) {
        tracing::warn!("Logging to console only, cannot open {}: {}", path.display(), e);
    }

    Ok(LogHandles {
        _file_guard: file_guard,
        mailer,
    })
}

fn file_appender(path: &Path) -> anyhow::Result<BasicRollingFileAppender> {
    rolling_appender(path, LOG_FILE_MAX_SIZE, LOG_FILE_BACKUPS)
}

fn rolling_appender(
    path: &Path,
    max_size: u64,
    backups: usize,
) -> anyhow::Result<BasicRollingFileAppender> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }

    let condition = RollingConditionBasic::new().max_size(max_size);
    Ok(BasicRollingFileAppender::new(path, condition, backups)?)
}
