//! Live worker bookkeeping.

use dashmap::DashMap;
use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;

/// Tracks which worker pids are currently alive.
///
/// The dispatcher thread mutates it on register/unregister commands while
/// the periodic thread prunes it; DashMap's internal locking covers the
/// crossing. The tracked processes are siblings of the coordinator, not
/// children, so liveness is probed with a zero-signal instead of wait().
#[derive(Default)]
pub struct WorkerRegistry {
    /// pid → ppid as the worker reported them.
    workers: DashMap<u32, u32>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32, ppid: u32) {
        tracing::debug!(pid, ppid, "registering worker");
        self.workers.insert(pid, ppid);
    }

    pub fn unregister(&self, pid: u32) {
        tracing::debug!(pid, "removing worker");
        self.workers.remove(&pid);
    }

    pub fn has(&self, pid: u32) -> bool {
        self.workers.contains_key(&pid)
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    /// Drop every tracked pid whose process no longer exists. ESRCH is the
    /// only positive evidence of death; EPERM means the process exists
    /// under another uid and stays registered.
    pub fn prune_dead(&self) {
        self.workers.retain(|pid, _| {
            if process_alive(*pid) {
                true
            } else {
                tracing::debug!(pid = *pid, "worker is not alive, removing from registry");
                false
            }
        });
    }
}

fn process_alive(pid: u32) -> bool {
    !matches!(
        signal::kill(Pid::from_raw(pid as i32), None),
        Err(Errno::ESRCH)
    )
}
