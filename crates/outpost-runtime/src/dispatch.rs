//! Routes reassembled coordinator messages to their targets.

use std::sync::Arc;

use bytes::Bytes;

use outpost_core::command::{Command, DecodeError};

use crate::registry::WorkerRegistry;
use crate::transport::HttpTransport;

/// Decodes completed messages and dispatches them by command variant.
pub struct CommandDispatcher {
    transport: Arc<dyn HttpTransport>,
    registry: Arc<WorkerRegistry>,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, registry: Arc<WorkerRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Act on one reassembled message. Undecodable input is logged and
    /// discarded; nothing here takes the coordinator down.
    pub fn process_message(&self, data: &[u8]) {
        let command = match Command::decode(data) {
            Ok(command) => command,
            Err(DecodeError::UnknownCommand(tag)) => {
                tracing::warn!(tag = %tag, "ignoring unknown command");
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, size = data.len(), "failed to decode command");
                return;
            }
        };

        match command {
            Command::EstablishConnection(endpoint) => {
                tracing::debug!(
                    url = %endpoint.url,
                    endpoint_hash = %hex::encode(endpoint.endpoint_hash.to_be_bytes()),
                    content_type = %endpoint.content_type,
                    headers = endpoint.headers.len(),
                    timeout_ms = endpoint.timeout_ms,
                    max_retries = endpoint.max_retries,
                    retry_delay_ms = endpoint.retry_delay_ms,
                    ssl = ?endpoint.ssl,
                    "establish connection"
                );
                self.transport.initialize_connection(&endpoint);
            }
            Command::SendEndpointPayload {
                endpoint_hash,
                payload,
            } => {
                tracing::debug!(
                    endpoint_hash = %hex::encode(endpoint_hash.to_be_bytes()),
                    size = payload.len(),
                    "endpoint payload"
                );
                self.transport.enqueue(endpoint_hash, Bytes::from(payload));
            }
            Command::WorkerStarted { pid, ppid } => {
                self.registry.register(pid, ppid);
            }
            Command::WorkerGoingToShutdown { pid, ppid } => {
                tracing::debug!(pid, ppid, "worker is going to shutdown");
                self.registry.unregister(pid);
            }
        }
    }
}
