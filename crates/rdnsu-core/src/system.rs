//! Operating system backed implementations of the process traits

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lock::LOCK_NAME_ENV;
use crate::traits::{Pid, ProcessControl, SpawnMode, WorkerHandle, WorkerLauncher};

/// Process probing and signalling through `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

#[cfg(unix)]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: Pid) -> bool {
        // 0 and values past i32::MAX would address process groups
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }

        // SAFETY: signal 0 performs the permission and existence checks only
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }

        std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
    }

    fn interrupt(&self, pid: Pid) -> Result<()> {
        let raw = libc::pid_t::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| Error::process(format!("Invalid process id {}", pid)))?;

        // SAFETY: plain signal delivery to a single positive pid
        if unsafe { libc::kill(raw, libc::SIGINT) } == -1 {
            return Err(Error::process(format!(
                "Failed to interrupt process {}: {}",
                pid,
                std::io::Error::last_os_error()
            )));
        }

        debug!("Sent SIGINT to {}", pid);
        Ok(())
    }
}

#[cfg(not(unix))]
impl ProcessControl for SystemProcesses {
    fn is_alive(&self, _pid: Pid) -> bool {
        // Without a probe, never reclaim a recorded owner
        true
    }

    fn interrupt(&self, pid: Pid) -> Result<()> {
        Err(Error::process(format!(
            "Interrupting process {} is not supported on this platform",
            pid
        )))
    }
}

/// Spawns the worker by re-executing a program with the `worker` subcommand
///
/// Forwarded arguments are appended after the subcommand. Only the lock name
/// is forwarded from the environment, together with the configuration
/// location variables so the worker reads the same file as its supervisor.
/// Values that must not show up in the process list, such as the password,
/// are passed with [`WorkerCommand::env`] instead of as arguments.
#[derive(Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    lock_name: String,
    envs: Vec<(String, OsString)>,
}

impl std::fmt::Debug for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self.envs.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("WorkerCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("lock_name", &self.lock_name)
            .field("env", &env_keys)
            .finish()
    }
}

/// Environment variables copied into the worker when set in the caller
const FORWARDED_ENV: &[&str] = &[
    crate::config::CONFIG_DIR_ENV,
    crate::config::CONFIG_FILE_ENV,
    crate::lock::LOCK_DIR_ENV,
    "PATH",
    "HOME",
];

impl WorkerCommand {
    /// Create a launcher for `program`
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>, lock_name: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            lock_name: lock_name.into(),
            envs: Vec::new(),
        }
    }

    /// Set an environment variable in the worker
    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Create a launcher for the currently running executable
    pub fn current_exe(args: Vec<OsString>, lock_name: impl Into<String>) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::process(format!("Cannot locate own executable: {}", e)))?;
        Ok(Self::new(program, args, lock_name))
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("worker")
            .args(&self.args)
            .env_clear()
            .env(LOCK_NAME_ENV, &self.lock_name);

        for key in FORWARDED_ENV {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(self.envs.iter().map(|(key, value)| (key, value)));

        if let Ok(dir) = std::env::current_dir() {
            cmd.current_dir(dir);
        }

        cmd
    }
}

#[async_trait]
impl WorkerLauncher for WorkerCommand {
    async fn launch(&self, mode: SpawnMode) -> Result<WorkerHandle> {
        let mut cmd = self.command();

        match mode {
            SpawnMode::Detached => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());

                #[cfg(unix)]
                {
                    // SAFETY: setsid is async-signal-safe
                    unsafe {
                        cmd.pre_exec(|| {
                            if libc::setsid() == -1 {
                                return Err(std::io::Error::last_os_error());
                            }
                            Ok(())
                        });
                    }
                }

                let child = cmd
                    .spawn()
                    .map_err(|e| Error::process(format!("Failed to spawn worker: {}", e)))?;
                let pid = child.id();
                debug!("Spawned detached worker {:?}", pid);

                // Dropping the handle leaves the worker running
                drop(child);

                Ok(WorkerHandle {
                    pid,
                    exit_code: None,
                })
            }
            SpawnMode::Attached => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .kill_on_drop(false);

                let mut child = cmd
                    .spawn()
                    .map_err(|e| Error::process(format!("Failed to spawn worker: {}", e)))?;
                let pid = child.id();
                info!("Worker running in foreground (pid {:?})", pid);

                // Ctrl-C reaches the whole foreground group; the worker shuts
                // itself down and we wait for it instead of dying first.
                let status = loop {
                    tokio::select! {
                        status = child.wait() => break status?,
                        _ = tokio::signal::ctrl_c() => {
                            debug!("Interrupt received, waiting for worker to exit");
                        }
                    }
                };

                Ok(WorkerHandle {
                    pid,
                    exit_code: status.code(),
                })
            }
        }
    }
}
