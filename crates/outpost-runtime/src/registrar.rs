//! Worker-side registration with the coordinator.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::unistd::{getpid, getppid};

use outpost_core::command::Command;

use crate::chunked::PayloadSender;
use crate::forkable::Forkable;

/// Announces this worker to the coordinator right after fork and withdraws
/// it at shutdown.
///
/// Delivery is best-effort with no retry: a coordinator that already exited
/// costs one debug line, nothing else. Registration happens in
/// `postfork(child)` so it is the first thing a worker sends, before any
/// telemetry command.
pub struct WorkerRegistrar {
    send_payload: PayloadSender,
    registered: AtomicBool,
}

impl WorkerRegistrar {
    pub fn new(send_payload: PayloadSender) -> Self {
        Self {
            send_payload,
            registered: AtomicBool::new(false),
        }
    }

    fn register_worker(&self) {
        let command = Command::WorkerStarted {
            pid: getpid().as_raw() as u32,
            ppid: getppid().as_raw() as u32,
        };
        match (self.send_payload)(&command.encode()) {
            Ok(()) => {
                self.registered.store(true, Ordering::Relaxed);
                tracing::debug!("sent worker registration to coordinator");
            }
            Err(err) => {
                tracing::debug!(error = %err, "failed to send worker registration to coordinator");
            }
        }
    }

    /// Withdraw this worker. Idempotent; also runs on drop.
    pub fn unregister_worker(&self) {
        if !self.registered.swap(false, Ordering::Relaxed) {
            return;
        }
        let command = Command::WorkerGoingToShutdown {
            pid: getpid().as_raw() as u32,
            ppid: getppid().as_raw() as u32,
        };
        match (self.send_payload)(&command.encode()) {
            Ok(()) => tracing::debug!("sent worker unregistration to coordinator"),
            Err(err) => {
                tracing::debug!(error = %err, "failed to send worker unregistration to coordinator");
            }
        }
    }
}

impl Forkable for WorkerRegistrar {
    fn prefork(&self) {}

    fn postfork(&self, child: bool) {
        if child {
            self.register_worker();
        }
    }
}

impl Drop for WorkerRegistrar {
    fn drop(&mut self) {
        self.unregister_worker();
    }
}
