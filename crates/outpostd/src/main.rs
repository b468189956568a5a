//! outpostd — demonstration bootstrap for the coordinator subsystem.
//!
//! Mirrors the host-process choreography end to end: the parent creates the
//! shared queue, forks the coordinator sidecar, then forks one worker. The
//! worker registers itself, announces an endpoint, ships a telemetry
//! payload through the queue, and shuts down. The coordinator drains,
//! exports through the debug transport, and exits on its own once the
//! parent is gone and no workers remain.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult};

use outpost_core::command::{EndpointConfig, SslOptions};
use outpost_core::config::{EnvIniProvider, RemoteConfigProvider};
use outpost_core::wire::endpoint_hash;
use outpost_runtime::agent::{self, Agent};
use outpost_runtime::diagnostics;
use outpost_runtime::forkable::Forkable;
use outpost_runtime::opamp::OpAmpDisabled;
use outpost_runtime::process::CoordinatorProcess;
use outpost_runtime::queue::{SharedQueue, DEFAULT_CAPACITY};
use outpost_runtime::transport::HttpTransport;

/// Logs what a real exporter would transmit.
struct DebugTransport;

impl Forkable for DebugTransport {
    fn prefork(&self) {}
    fn postfork(&self, _child: bool) {}
}

impl HttpTransport for DebugTransport {
    fn initialize_connection(&self, endpoint: &EndpointConfig) {
        tracing::info!(
            url = %endpoint.url,
            endpoint_hash = %hex::encode(endpoint.endpoint_hash.to_be_bytes()),
            "debug transport: endpoint initialized"
        );
    }

    fn enqueue(&self, endpoint_hash: u64, payload: Bytes) {
        tracing::info!(
            endpoint_hash = %hex::encode(endpoint_hash.to_be_bytes()),
            size = payload.len(),
            "debug transport: payload ready for export"
        );
    }
}

fn main() -> Result<()> {
    // Initialise tracing — RUST_LOG controls verbosity
    // e.g. RUST_LOG=debug cargo run -p outpostd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let queue_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("outpost-{}", std::process::id()));

    tracing::info!(queue = %queue_name, "outpostd starting");
    let queue = Arc::new(
        SharedQueue::create(&queue_name, DEFAULT_CAPACITY).context("creating shared queue")?,
    );

    // Coordinator graph, built in the parent before any fork.
    let coordinator = CoordinatorProcess::new(
        queue.clone(),
        Arc::new(DebugTransport),
        Arc::new(OpAmpDisabled),
        Arc::new(EnvIniProvider::env_only()),
        Arc::new(RemoteConfigProvider::new()),
        None,
    );

    coordinator.prefork();
    let is_coordinator = match coordinator.start() {
        Ok(is_coordinator) => is_coordinator,
        Err(err) => {
            tracing::warn!(error = %err, "continuing without coordination");
            false
        }
    };
    if is_coordinator {
        // The coordinator loop already ran to completion.
        return Ok(());
    }
    coordinator.postfork(false);

    // Worker side: same queue, agent container, explicit fork protocol.
    let agent = Agent::new(
        queue.clone(),
        Arc::new(EnvIniProvider::env_only()),
        Arc::new(RemoteConfigProvider::new()),
        None,
        Vec::new(),
    );
    agent::install(agent.clone());

    println!(
        "{}",
        diagnostics::render_info(&agent.config_manager(), &agent.config().get())
    );

    agent.forkables().prefork();
    // Safety: prefork quiesced every registered background thread.
    match unsafe { fork() }.context("forking worker")? {
        ForkResult::Child => {
            agent.forkables().postfork(true);
            run_worker(&agent);
            agent.shutdown();
            std::process::exit(0);
        }
        ForkResult::Parent { child } => {
            agent.forkables().postfork(false);
            waitpid(child, None).context("waiting for worker")?;
            tracing::info!("worker finished; parent exiting, coordinator drains and stops on its own");
        }
    }

    // Leave the coordinator a moment to drain before the queue name goes away.
    std::thread::sleep(Duration::from_millis(500));
    Ok(())
}

fn run_worker(agent: &Agent) {
    let snapshot = agent.config().get();
    if !snapshot.enabled {
        tracing::info!("telemetry disabled by configuration, worker does nothing");
        return;
    }

    let url = format!("{}/v1/traces", snapshot.otlp_endpoint);
    let endpoint = EndpointConfig {
        endpoint_hash: endpoint_hash(&url),
        url,
        content_type: "application/x-protobuf".into(),
        headers: vec![("user-agent".into(), "outpost-worker".into())],
        timeout_ms: snapshot.otlp_timeout_ms,
        max_retries: snapshot.max_send_retries,
        retry_delay_ms: snapshot.retry_delay_ms,
        ssl: SslOptions {
            insecure_skip_verify: snapshot.otlp_insecure,
            ..SslOptions::default()
        },
    };

    let signals = agent.signals();
    signals.initialize_connection(&endpoint);
    signals.enqueue(
        endpoint.endpoint_hash,
        Bytes::from(vec![0x0A; 9000]), // a span batch big enough to chunk
    );
    tracing::info!(pid = std::process::id(), "worker sent its telemetry");
}
