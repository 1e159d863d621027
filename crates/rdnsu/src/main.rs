// # rdnsu - Remote DNS Updater
//
// One binary, two roles:
//
// - **Supervisor** (`start`, `stop`, `restart`, or no subcommand): a
//   short-lived control process. It validates the configuration, then starts
//   or stops the worker through the instance lock.
// - **Worker** (hidden `worker` subcommand): claims the instance lock and runs
//   the update loop until SIGINT, SIGHUP or SIGTERM.
//
// ## Configuration
//
// JSON file (`$RDNSU_CONFIG_DIR/config.json`, default `/etc/rdnsu`) overlaid
// by command line flags; see `rdnsu --help`.
//
// ## Environment
//
// - `RDNSU_CONFIG_DIR`: configuration directory
// - `RDNSU_CONFIG_FILE`: configuration file name
// - `RDNSU_PASSWORD`: provider password, when `--password` is not given
// - `RDNSU_LOCK_NAME`: instance lock name (default `Remote DNS Updater`)
// - `RDNSU_LOCK_DIR`: instance lock directory (default: system temp dir)
//
// ## Example
//
// ```bash
// rdnsu start -H members.dyndns.org -A /nic/update -u alice -p secret \
//     -D home.example.com --save
// rdnsu stop
// ```

mod cli;
mod logging;
mod mail;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, Settings};
use mail::MailTask;
use rdnsu_core::lock::lock_name_from_env;
use rdnsu_core::traits::ProcessControl;
use rdnsu_core::{
    Configuration, InstanceLock, Scheduler, StartOutcome, Supervisor, SystemProcesses,
    UpdateEngine, WorkerCommand,
};
use rdnsu_ip_http::HttpIpResolver;
use rdnsu_provider_dyndns::HttpUpdateTransport;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy)]
enum RdnsuExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<RdnsuExitCode> for ExitCode {
    fn from(code: RdnsuExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Worker) => worker_main(&cli.settings),
        command => supervisor_main(command, &cli.settings),
    }
}

fn runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => Some(runtime),
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            None
        }
    }
}

fn worker_main(settings: &Settings) -> ExitCode {
    let config = match settings.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return RdnsuExitCode::ConfigError.into();
        }
    };

    let level = cli::effective_level(config.logging_level, settings.verbose);
    let log_file = config.log_file_path();
    let mut logs = match logging::init(level, Some(&log_file), config.email.as_ref()) {
        Ok(logs) => logs,
        Err(e) => {
            eprintln!("Failed to set tracing subscriber: {}", e);
            return RdnsuExitCode::ConfigError.into();
        }
    };

    let Some(rt) = runtime() else {
        return RdnsuExitCode::RuntimeError.into();
    };

    rt.block_on(async {
        let mail = logs.mailer.take().map(MailTask::spawn);

        let code = match run_worker(config).await {
            Ok(()) => RdnsuExitCode::CleanShutdown,
            Err(e) => {
                error!("Worker error: {}", e);
                RdnsuExitCode::RuntimeError
            }
        };

        if let Some(mail) = mail {
            mail.finish().await;
        }

        code
    })
    .into()
}

/// Run the update loop under the instance lock until shutdown
async fn run_worker(config: Configuration) -> Result<()> {
    let shutdown = ShutdownSignals::install()?;

    let resolver = HttpIpResolver::new()?;
    let transport = HttpUpdateTransport::new()?;
    let mut engine = UpdateEngine::new(&config, Box::new(resolver), Box::new(transport));
    let scheduler = Scheduler::new(config.interval())?;

    let processes: Arc<dyn ProcessControl> = Arc::new(SystemProcesses);
    let lock = InstanceLock::from_env(processes);

    info!(
        "{} {} starting (pid {}): updating {} via {}://{}{} every {} minute(s)",
        rdnsu_core::APP_NAME,
        rdnsu_core::VERSION,
        lock.pid(),
        config.dns_record,
        config.protocol,
        config.remote_hostname,
        config.path,
        config.update_interval
    );

    let finished = scheduler
        .run_locked(&lock, &mut engine, async move {
            let signal = shutdown.recv().await;
            info!("Received shutdown signal: {}", signal);
        })
        .await?;

    if let Some(cycles) = finished {
        info!("Shutting down after {} update cycle(s)", cycles);
    }
    Ok(())
}

/// Signals that end the worker gracefully
#[cfg(unix)]
struct ShutdownSignals {
    sigint: Signal,
    sighup: Signal,
    sigterm: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Register the handlers up front so no signal is missed during startup
    fn install() -> Result<Self> {
        let handler = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| anyhow::anyhow!("Failed to setup {} handler: {}", name, e))
        };

        Ok(Self {
            sigint: handler(SignalKind::interrupt(), "SIGINT")?,
            sighup: handler(SignalKind::hangup(), "SIGHUP")?,
            sigterm: handler(SignalKind::terminate(), "SIGTERM")?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sighup.recv() => "SIGHUP",
            _ = self.sigterm.recv() => "SIGTERM",
        }
    }
}

/// Fallback for non-Unix platforms: Ctrl-C only
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL-C",
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending::<&'static str>().await
            }
        }
    }
}

fn supervisor_main(command: Option<Command>, settings: &Settings) -> ExitCode {
    // Stopping never needs a valid configuration
    let level = if command == Some(Command::Stop) {
        settings.console_level()
    } else {
        match settings.resolve() {
            Ok(config) => cli::effective_level(config.logging_level, settings.verbose),
            Err(e) => {
                eprintln!("{}", e);
                return RdnsuExitCode::ConfigError.into();
            }
        }
    };

    let _logs = match logging::init(level, None, None) {
        Ok(logs) => logs,
        Err(e) => {
            eprintln!("Failed to set tracing subscriber: {}", e);
            return RdnsuExitCode::ConfigError.into();
        }
    };

    let Some(rt) = runtime() else {
        return RdnsuExitCode::RuntimeError.into();
    };

    rt.block_on(async {
        match run_supervisor(command, settings).await {
            Ok(code) => code,
            Err(e) => {
                error!("{}", e);
                RdnsuExitCode::RuntimeError.into()
            }
        }
    })
}

async fn run_supervisor(command: Option<Command>, settings: &Settings) -> Result<ExitCode> {
    let processes: Arc<dyn ProcessControl> = Arc::new(SystemProcesses);
    let mut launcher = WorkerCommand::current_exe(settings.worker_args(), lock_name_from_env())?;
    for (key, value) in settings.worker_env() {
        launcher = launcher.env(key, value);
    }
    let supervisor = Supervisor::new(
        InstanceLock::from_env(processes.clone()),
        processes,
        Box::new(launcher),
    );

    let code = match command {
        Some(Command::Start) => start_exit_code(supervisor.start().await?),
        Some(Command::Stop) => {
            supervisor.stop().await?;
            RdnsuExitCode::CleanShutdown.into()
        }
        Some(Command::Restart) => match supervisor.restart().await? {
            Some(outcome) => start_exit_code(outcome),
            None => RdnsuExitCode::CleanShutdown.into(),
        },
        Some(Command::Worker) | None => match supervisor.foreground().await? {
            Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)),
            None => {
                info!("Worker was terminated by a signal.");
                RdnsuExitCode::RuntimeError.into()
            }
        },
    };

    Ok(code)
}

fn start_exit_code(outcome: StartOutcome) -> ExitCode {
    match outcome {
        StartOutcome::AlreadyRunning { .. } | StartOutcome::Started { .. } => {
            RdnsuExitCode::CleanShutdown.into()
        }
        StartOutcome::NotConfirmed => RdnsuExitCode::RuntimeError.into(),
    }
}
