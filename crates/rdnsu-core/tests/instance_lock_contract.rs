//! Contract Test: Instance Lock
//!
//! - Absent records read as "unowned"
//! - A live owner is never displaced; a dead one is reclaimed
//! - Only the owner can release the lock, and release is idempotent
//! - Storage errors other than absence are fatal

mod common;

use common::*;
use rdnsu_core::{Error, InstanceLock, SystemProcesses};
use std::sync::Arc;

const NAME: &str = "Remote DNS Updater";

fn lock_for(dir: &tempfile::TempDir, processes: &FakeProcesses, pid: u32) -> InstanceLock {
    InstanceLock::with_pid(NAME, dir.path(), Arc::new(processes.clone()), pid)
}

#[test]
fn absent_record_is_unowned() {
    let dir = tempfile::tempdir().unwrap();
    let lock = lock_for(&dir, &FakeProcesses::new(), 100);

    assert_eq!(lock.owner_pid().unwrap(), None);
    assert_eq!(lock.live_owner().unwrap(), None);
    assert!(!lock.record_path().exists());
}

#[test]
fn lock_records_owner() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    processes.spawn(100);
    let lock = lock_for(&dir, &processes, 100);

    assert!(lock.lock().unwrap());
    assert_eq!(lock.owner_pid().unwrap(), Some(100));
    assert_eq!(lock.live_owner().unwrap(), Some(100));
}

#[test]
fn second_caller_is_refused_while_owner_lives() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    processes.spawn(100);
    processes.spawn(200);

    let first = lock_for(&dir, &processes, 100);
    let second = lock_for(&dir, &processes, 200);

    assert!(first.lock().unwrap());
    assert!(!second.lock().unwrap());
    assert_eq!(second.owner_pid().unwrap(), Some(100));
}

#[test]
fn second_caller_reclaims_dead_owner() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    processes.spawn(100);
    processes.spawn(200);

    let first = lock_for(&dir, &processes, 100);
    let second = lock_for(&dir, &processes, 200);

    assert!(first.lock().unwrap());
    processes.kill(100);

    assert_eq!(second.owner_pid().unwrap(), Some(100));
    assert_eq!(second.live_owner().unwrap(), None);
    assert!(second.lock().unwrap());
    assert_eq!(second.owner_pid().unwrap(), Some(200));
}

#[test]
fn relocking_by_owner_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    processes.spawn(100);
    let lock = lock_for(&dir, &processes, 100);

    assert!(lock.lock().unwrap());
    assert!(lock.lock().unwrap());
}

#[test]
fn unlock_by_non_owner_leaves_record() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    processes.spawn(100);

    let owner = lock_for(&dir, &processes, 100);
    let other = lock_for(&dir, &processes, 200);

    assert!(owner.lock().unwrap());
    other.unlock().unwrap();

    assert_eq!(owner.owner_pid().unwrap(), Some(100));
}

#[test]
fn unlock_clears_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    processes.spawn(100);
    let lock = lock_for(&dir, &processes, 100);

    lock.unlock().unwrap();
    assert!(lock.lock().unwrap());
    lock.unlock().unwrap();
    lock.unlock().unwrap();

    assert_eq!(lock.owner_pid().unwrap(), None);
}

#[test]
fn locks_with_different_names_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    processes.spawn(100);
    processes.spawn(200);

    let a = InstanceLock::with_pid("alpha", dir.path(), Arc::new(processes.clone()), 100);
    let b = InstanceLock::with_pid("beta", dir.path(), Arc::new(processes.clone()), 200);

    assert!(a.lock().unwrap());
    assert!(b.lock().unwrap());
}

#[test]
fn corrupted_record_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let lock = lock_for(&dir, &FakeProcesses::new(), 100);
    std::fs::write(lock.record_path(), "{ definitely not json").unwrap();

    assert!(matches!(lock.owner_pid(), Err(Error::LockIo(_))));
    assert!(matches!(lock.lock(), Err(Error::LockIo(_))));
}

#[test]
fn unreadable_record_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let lock = lock_for(&dir, &FakeProcesses::new(), 100);
    // A directory where the record file should be cannot be read as a file
    std::fs::create_dir(lock.record_path()).unwrap();

    assert!(matches!(lock.owner_pid(), Err(Error::LockIo(_))));
}

#[cfg(unix)]
#[test]
fn system_probe_keeps_current_process_as_owner() {
    let dir = tempfile::tempdir().unwrap();
    let processes = Arc::new(SystemProcesses);

    let me = InstanceLock::new(NAME, dir.path(), processes.clone());
    assert_eq!(me.pid(), std::process::id());
    assert!(me.lock().unwrap());

    // Any other caller sees a live owner
    let other = InstanceLock::with_pid(NAME, dir.path(), processes, 0);
    assert!(!other.lock().unwrap());
    assert_eq!(other.live_owner().unwrap(), Some(std::process::id()));

    me.unlock().unwrap();
}

#[cfg(unix)]
#[test]
fn concurrent_acquisition_has_a_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let processes = FakeProcesses::new();
    for pid in 1..=8 {
        processes.spawn(pid);
    }

    let handles: Vec<_> = (1..=8)
        .map(|pid| {
            let lock = lock_for(&dir, &processes, pid);
            std::thread::spawn(move || lock.lock().unwrap())
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
}
