//! Test doubles and common utilities for contract tests
//!
//! These fakes stand in for the network and the operating system and record
//! every call so tests can assert what the core did (or did not) do.

#![allow(dead_code)]

use rdnsu_core::error::{Error, Result};
use rdnsu_core::traits::{
    IpResolver, Pid, ProcessControl, SpawnMode, UpdateRequest, UpdateTransport, WorkerHandle,
    WorkerLauncher,
};
use rdnsu_core::{ConfigLayer, Configuration, InstanceLock};
use std::collections::{HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// What the fake resolver answers
#[derive(Debug, Clone, Copy)]
pub enum Lookup {
    Ip(Ipv4Addr),
    Timeout,
    Fail,
}

/// A resolver whose answer can be changed while the engine owns it
#[derive(Clone)]
pub struct FakeResolver {
    answer: Arc<Mutex<Lookup>>,
    calls: Arc<AtomicUsize>,
}

impl FakeResolver {
    pub fn new(answer: Lookup) -> Self {
        Self {
            answer: Arc::new(Mutex::new(answer)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn returning(ip: Ipv4Addr) -> Self {
        Self::new(Lookup::Ip(ip))
    }

    pub fn set(&self, answer: Lookup) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpResolver for FakeResolver {
    async fn resolve_v4(&self) -> Result<Ipv4Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.answer.lock().unwrap() {
            Lookup::Ip(ip) => Ok(ip),
            Lookup::Timeout => Err(Error::resolver_timeout("fake lookup timed out")),
            Lookup::Fail => Err(Error::resolver("fake lookup refused")),
        }
    }
}

/// What the fake transport answers
#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Timeout,
    Fail,
}

impl Reply {
    pub fn body(body: &str) -> Self {
        Reply::Body(body.to_string())
    }
}

/// A transport that replays scripted replies and records every request
///
/// Once the script is exhausted the last reply repeats. Scripted delays are
/// consumed one per request; requests past the script answer at once.
#[derive(Clone)]
pub struct FakeTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    last: Arc<Mutex<Reply>>,
    requests: Arc<Mutex<Vec<UpdateRequest>>>,
    delays: Arc<Mutex<VecDeque<Duration>>>,
    starts: Arc<Mutex<Vec<Instant>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub fn replying(replies: Vec<Reply>) -> Self {
        let last = replies.last().cloned().unwrap_or_else(|| Reply::body("good"));
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            last: Arc::new(Mutex::new(last)),
            requests: Arc::new(Mutex::new(Vec::new())),
            delays: Arc::new(Mutex::new(VecDeque::new())),
            starts: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap() = delays.into();
        self
    }

    pub fn always(body: &str) -> Self {
        Self::replying(vec![Reply::body(body)])
    }

    pub fn requests(&self) -> Vec<UpdateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// When each request started
    pub fn request_starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }

    /// Highest number of requests that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl UpdateTransport for FakeTransport {
    async fn send(&self, request: &UpdateRequest) -> Result<String> {
        self.starts.lock().unwrap().push(Instant::now());
        self.requests.lock().unwrap().push(request.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.lock().unwrap().clone());

        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Timeout => Err(Error::transport_timeout("fake request timed out")),
            Reply::Fail => Err(Error::transport("connection refused")),
        }
    }
}

/// A process table with explicit liveness
#[derive(Clone, Default)]
pub struct FakeProcesses {
    alive: Arc<Mutex<HashSet<Pid>>>,
    interrupts: Arc<Mutex<Vec<Pid>>>,
    exit_on_interrupt: Arc<Mutex<bool>>,
}

impl FakeProcesses {
    pub fn new() -> Self {
        let processes = Self::default();
        *processes.exit_on_interrupt.lock().unwrap() = true;
        processes
    }

    /// Processes ignore SIGINT and keep running
    pub fn stubborn() -> Self {
        Self::default()
    }

    pub fn spawn(&self, pid: Pid) {
        self.alive.lock().unwrap().insert(pid);
    }

    pub fn kill(&self, pid: Pid) {
        self.alive.lock().unwrap().remove(&pid);
    }

    pub fn interrupts(&self) -> Vec<Pid> {
        self.interrupts.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeProcesses {
    fn is_alive(&self, pid: Pid) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn interrupt(&self, pid: Pid) -> Result<()> {
        if !self.is_alive(pid) {
            return Err(Error::process(format!("No such process {}", pid)));
        }
        self.interrupts.lock().unwrap().push(pid);
        if *self.exit_on_interrupt.lock().unwrap() {
            self.kill(pid);
        }
        Ok(())
    }
}

/// A launcher that pretends to start a worker process
///
/// With `claims_lock` set, the "worker" immediately becomes alive and
/// acquires the instance lock under `worker_pid`, like a real worker would.
#[derive(Clone)]
pub struct FakeLauncher {
    processes: FakeProcesses,
    lock_name: String,
    lock_dir: PathBuf,
    worker_pid: Pid,
    claims_lock: bool,
    launches: Arc<Mutex<Vec<SpawnMode>>>,
}

impl FakeLauncher {
    pub fn new(
        processes: FakeProcesses,
        lock_name: &str,
        lock_dir: PathBuf,
        worker_pid: Pid,
        claims_lock: bool,
    ) -> Self {
        Self {
            processes,
            lock_name: lock_name.to_string(),
            lock_dir,
            worker_pid,
            claims_lock,
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn launches(&self) -> Vec<SpawnMode> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WorkerLauncher for FakeLauncher {
    async fn launch(&self, mode: SpawnMode) -> Result<WorkerHandle> {
        self.launches.lock().unwrap().push(mode);

        if mode == SpawnMode::Attached {
            return Ok(WorkerHandle {
                pid: Some(self.worker_pid),
                exit_code: Some(0),
            });
        }

        if self.claims_lock {
            self.processes.spawn(self.worker_pid);
            let lock = InstanceLock::with_pid(
                self.lock_name.clone(),
                &self.lock_dir,
                Arc::new(self.processes.clone()),
                self.worker_pid,
            );
            assert!(lock.lock()?, "fake worker should acquire the lock");
        }

        Ok(WorkerHandle {
            pid: Some(self.worker_pid),
            exit_code: None,
        })
    }
}

/// A valid configuration with the given reminder cadence
pub fn test_config(remind_count: u32) -> Configuration {
    Configuration::from_layer(ConfigLayer {
        remote_hostname: Some("members.example.net".to_string()),
        path: Some("/nic/update".to_string()),
        user: Some("alice".to_string()),
        password: Some("s3cret".to_string()),
        dns_record: Some("home.example.com".to_string()),
        remind_user_of_suspension_count: Some(remind_count),
        ..ConfigLayer::default()
    })
    .expect("test configuration is valid")
}
