//! Coordinator command schema — what reassembled chunk payloads decode to.
//!
//! Commands travel as JSON with a `"command"` tag. The tag is dispatched
//! before the body is decoded, so a receiver built against an older schema
//! reports an unknown tag distinctly from malformed input and can skip it
//! (forward compatibility: unknown variants are ignored, never fatal).

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Endpoint description ─────────────────────────────────────────────────────

/// TLS options for an outbound endpoint connection.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslOptions {
    pub insecure_skip_verify: bool,
    pub ca_info: String,
    pub cert: String,
    pub cert_key: String,
    pub cert_key_password: String,
}

/// `cert_key_password` must never reach a log line.
impl fmt::Debug for SslOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SslOptions")
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("ca_info", &self.ca_info)
            .field("cert", &self.cert)
            .field("cert_key", &self.cert_key)
            .field(
                "cert_key_password",
                &if self.cert_key_password.is_empty() {
                    ""
                } else {
                    "<redacted>"
                },
            )
            .finish()
    }
}

/// Everything the transport needs to open an outbound endpoint connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    pub endpoint_hash: u64,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub ssl: SslOptions,
}

// ── Commands ─────────────────────────────────────────────────────────────────

/// One logical instruction from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Open (or reconfigure) an outbound endpoint connection.
    EstablishConnection(EndpointConfig),

    /// Ship one serialized telemetry payload to an already-established
    /// endpoint.
    SendEndpointPayload { endpoint_hash: u64, payload: Vec<u8> },

    /// A freshly forked worker announcing itself.
    WorkerStarted { pid: u32, ppid: u32 },

    /// A worker about to exit, withdrawing itself from the registry.
    WorkerGoingToShutdown { pid: u32, ppid: u32 },
}

/// Tags `Command::decode` recognizes. Must match the serde renames above.
const KNOWN_TAGS: [&str; 4] = [
    "establish_connection",
    "send_endpoint_payload",
    "worker_started",
    "worker_going_to_shutdown",
];

impl Command {
    /// Serialize for transmission.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("command serialization failed")
    }

    /// Decode one received command payload.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        let tag = value
            .get("command")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingTag)?;
        if !KNOWN_TAGS.contains(&tag) {
            return Err(DecodeError::UnknownCommand(tag.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Why a received command payload could not be acted on.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("command payload is not valid: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("command payload carries no command tag")]
    MissingTag,

    #[error("unknown command tag '{0}'")]
    UnknownCommand(String),
}

// ── Tests ────────────────────────────────────────────────────────────────────
