//! Dispatcher, registry, and coordinator-tick scenarios.

use crate::*;

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use outpost_core::command::SslOptions;
use outpost_core::wire::endpoint_hash;
use outpost_runtime::chunked::PayloadSender;
use outpost_runtime::dispatch::CommandDispatcher;
use outpost_runtime::process::CoordinatorTick;
use outpost_runtime::registrar::WorkerRegistrar;
use outpost_runtime::registry::WorkerRegistry;
use outpost_runtime::signals::CoordinatorSignalsSender;

fn endpoint(url: &str) -> EndpointConfig {
    EndpointConfig {
        endpoint_hash: endpoint_hash(url),
        url: url.into(),
        content_type: "application/x-protobuf".into(),
        headers: vec![("authorization".into(), "Bearer token".into())],
        timeout_ms: 10_000,
        max_retries: 3,
        retry_delay_ms: 500,
        ssl: SslOptions::default(),
    }
}

/// The full worker-to-coordinator path: signals sender and registrar encode
/// commands, frames cross the kernel queue, reassembly feeds the
/// dispatcher, and the transport and registry see the results.
#[test]
fn worker_commands_flow_through_queue_to_transport_and_registry() {
    let queue = unique_queue("flow");
    let transport = Arc::new(RecordingTransport::default());
    let registry = Arc::new(WorkerRegistry::new());
    let dispatcher = Arc::new(CommandDispatcher::new(transport.clone(), registry.clone()));

    let receiver = ChunkedProcessor::new(queue.clone(), {
        let dispatcher = dispatcher.clone();
        Box::new(move |message| dispatcher.process_message(&message))
    });

    // Worker side, sharing the queue the way forked workers share the
    // inherited descriptor.
    let sender_processor = Arc::new(ChunkedProcessor::new(queue, Box::new(|_| {})));
    let send_payload: PayloadSender = {
        let processor = sender_processor.clone();
        Arc::new(move |payload: &[u8]| processor.send_payload(payload))
    };
    let registrar = WorkerRegistrar::new(send_payload.clone());
    let signals = CoordinatorSignalsSender::new(send_payload);

    registrar.postfork(true);
    let traces = endpoint("https://collector.example/v1/traces");
    signals.initialize_connection(&traces);
    // Big enough that the encoded command spans several frames, small
    // enough that everything in flight fits the test queue.
    signals.enqueue(traces.endpoint_hash, Bytes::from(vec![7u8; 2000]));

    drain(&receiver);

    assert!(registry.has(std::process::id()));

    let connections = transport.connections.lock().unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0], traces);

    let payloads = transport.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].0, traces.endpoint_hash);
    assert_eq!(payloads[0].1.len(), 2000);
    drop(payloads);
    drop(connections);

    registrar.unregister_worker();
    drain(&receiver);
    assert!(!registry.has(std::process::id()));
    assert_eq!(registry.count(), 0);
}

/// Unknown and undecodable messages are absorbed without disturbing state.
#[test]
fn dispatcher_survives_unknown_and_garbage_messages() {
    let transport = Arc::new(RecordingTransport::default());
    let registry = Arc::new(WorkerRegistry::new());
    let dispatcher = CommandDispatcher::new(transport.clone(), registry.clone());

    let unknown = serde_json::json!({ "command": "defragment_disk", "level": 11 });
    dispatcher.process_message(unknown.to_string().as_bytes());
    dispatcher.process_message(b"\x00\x01\x02 garbage");
    dispatcher.process_message(br#"{"no_tag":true}"#);

    assert_eq!(registry.count(), 0);
    assert!(transport.connections.lock().unwrap().is_empty());
    assert!(transport.payloads.lock().unwrap().is_empty());

    // A valid command afterwards still works.
    dispatcher.process_message(&encoded(&Command::WorkerStarted { pid: 4242, ppid: 1 }));
    assert!(registry.has(4242));
}

/// Registry prune against a real dead process.
#[test]
fn prune_dead_uses_the_zero_signal_probe() {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("spawn true");
    let dead_pid = child.id();
    child.wait().expect("reap child");

    let registry = WorkerRegistry::new();
    registry.register(dead_pid, std::process::id());
    registry.register(std::process::id(), 1);
    assert_eq!(registry.count(), 2);

    registry.prune_dead();
    assert!(!registry.has(dead_pid));
    assert!(registry.has(std::process::id()));
}

/// S8 — with the parent gone and the only registered worker dead, one tick
/// clears `working`; the loop would exit on its next 100 ms poll.
#[test]
fn tick_stops_the_coordinator_when_parent_and_workers_are_gone() {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("spawn true");
    let dead_pid = child.id();
    child.wait().expect("reap child");

    let working = Arc::new(AtomicBool::new(true));
    let registry = Arc::new(WorkerRegistry::new());
    registry.register(dead_pid, 1);

    let (processor, _received) = collecting_processor("tick");
    // A parent pid that cannot be ours: the tick must conclude the original
    // parent is gone.
    let tick = CoordinatorTick::new(
        i32::MAX,
        working.clone(),
        registry.clone(),
        Arc::new(processor),
    );

    tick.run(Instant::now());
    assert_eq!(registry.count(), 0);
    assert!(!working.load(std::sync::atomic::Ordering::Relaxed));
}

/// While any registered worker is alive, the coordinator keeps working even
/// without its parent.
#[test]
fn tick_keeps_working_while_workers_live() {
    let working = Arc::new(AtomicBool::new(true));
    let registry = Arc::new(WorkerRegistry::new());
    registry.register(std::process::id(), 1);

    let (processor, _received) = collecting_processor("tick-alive");
    let tick = CoordinatorTick::new(
        i32::MAX,
        working.clone(),
        registry.clone(),
        Arc::new(processor),
    );

    tick.run(Instant::now());
    assert_eq!(registry.count(), 1);
    assert!(working.load(std::sync::atomic::Ordering::Relaxed));
}

/// The tick's cleanup cadence removes abandoned partials once the interval
/// elapses.
#[test]
fn tick_garbage_collects_on_its_cleanup_interval() {
    let working = Arc::new(AtomicBool::new(true));
    let registry = Arc::new(WorkerRegistry::new());
    registry.register(std::process::id(), 1);

    let (processor, _received) = collecting_processor("tick-gc");
    let processor = Arc::new(processor);

    // One orphaned chunk of a three-chunk message.
    let payload = vec![1u8; outpost_core::wire::FRAME_BODY * 2 + 10];
    let frame = outpost_core::wire::ChunkFrame::for_chunk(55, 9, &payload, 0);
    processor
        .process_frame(zerocopy::AsBytes::as_bytes(&frame))
        .unwrap();
    assert_eq!(processor.partial_count(), 1);

    let tick = CoordinatorTick::new(i32::MAX, working, registry, processor.clone());

    // Inside the cleanup interval nothing happens.
    tick.run(Instant::now());
    assert_eq!(processor.partial_count(), 1);

    // Past the interval and the partial's max age, it goes away.
    tick.run(Instant::now() + Duration::from_secs(61));
    assert_eq!(processor.partial_count(), 0);
}
