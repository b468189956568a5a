//! outpost-core — wire format, command schema, and configuration model.
//! Both the worker-side agent and the coordinator daemon depend on this one.

pub mod command;
pub mod config;
pub mod vendor;
pub mod wire;

pub use command::{Command, DecodeError, EndpointConfig, SslOptions};
pub use wire::{endpoint_hash, ChunkFrame, FrameHeader, FRAME_BODY, SLOT_BYTES};
