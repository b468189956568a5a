//! outpost-runtime — the coordinator sidecar and the worker-side agent.
//!
//! One long-lived coordinator process, forked from the host before any
//! worker exists, owns the outbound connections and drains a shared kernel
//! queue that every worker writes framed telemetry commands into.

pub mod agent;
pub mod chunked;
pub mod diagnostics;
pub mod dispatch;
pub mod forkable;
pub mod opamp;
pub mod periodic;
pub mod process;
pub mod queue;
pub mod registrar;
pub mod registry;
pub mod signals;
pub mod transport;

pub use chunked::{ChunkedProcessor, ReceiveError, SendError};
pub use forkable::{Forkable, ForkableRegistry};
pub use process::CoordinatorProcess;
pub use queue::{QueueError, SharedQueue};
pub use registry::WorkerRegistry;
