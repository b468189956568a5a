//! Outbound HTTP transport seam.
//!
//! The transport implementation (connection pooling, retries, TLS) lives
//! outside this crate. The coordinator's dispatcher and the worker-side
//! signals sender speak only this trait.

use bytes::Bytes;

use outpost_core::command::EndpointConfig;

use crate::forkable::Forkable;

/// A transport owns background threads, hence the fork protocol.
pub trait HttpTransport: Forkable {
    /// Open (or reconfigure) the outbound connection for an endpoint.
    fn initialize_connection(&self, endpoint: &EndpointConfig);

    /// Hand one serialized telemetry payload to the endpoint's send queue.
    /// The transport's own retry machinery deals with delivery failures.
    fn enqueue(&self, endpoint_hash: u64, payload: Bytes);
}
