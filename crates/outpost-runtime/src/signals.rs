//! Worker-side telemetry signal path.
//!
//! Workers own no sockets. Everything a worker would send over HTTP is
//! encoded as a coordinator command and shipped through the shared queue;
//! the coordinator's transport does the actual network work. Once the queue
//! is persistently unavailable (the coordinator died), the worker degrades
//! to a no-op rather than stalling request threads.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use outpost_core::command::{Command, EndpointConfig};

use crate::chunked::{PayloadSender, SendError};
use crate::forkable::Forkable;
use crate::transport::HttpTransport;

pub struct CoordinatorSignalsSender {
    send_payload: PayloadSender,
    degraded: AtomicBool,
}

impl CoordinatorSignalsSender {
    pub fn new(send_payload: PayloadSender) -> Self {
        Self {
            send_payload,
            degraded: AtomicBool::new(false),
        }
    }

    fn send_command(&self, command: &Command, what: &'static str) {
        if self.degraded.load(Ordering::Relaxed) {
            tracing::trace!(what, "coordinator ipc degraded, dropping signal");
            return;
        }
        match (self.send_payload)(&command.encode()) {
            Ok(()) => {}
            // A full queue is pressure, not death; keep trying later.
            Err(SendError::QueueFull) => {
                tracing::debug!(what, "shared queue full, dropping signal");
            }
            Err(err) => {
                self.degraded.store(true, Ordering::Relaxed);
                tracing::debug!(what, error = %err, "coordinator unreachable, degrading to no-op");
            }
        }
    }
}

impl Forkable for CoordinatorSignalsSender {
    fn prefork(&self) {}
    fn postfork(&self, _child: bool) {}
}

impl HttpTransport for CoordinatorSignalsSender {
    fn initialize_connection(&self, endpoint: &EndpointConfig) {
        self.send_command(
            &Command::EstablishConnection(endpoint.clone()),
            "establish_connection",
        );
    }

    fn enqueue(&self, endpoint_hash: u64, payload: Bytes) {
        self.send_command(
            &Command::SendEndpointPayload {
                endpoint_hash,
                payload: payload.to_vec(),
            },
            "send_endpoint_payload",
        );
    }
}
