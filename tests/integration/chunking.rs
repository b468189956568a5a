//! Chunked transfer scenarios over a real kernel queue.

use crate::*;

use std::time::{Duration, Instant};

use outpost_core::wire::{ChunkFrame, FRAME_BODY};
use outpost_runtime::queue::QueueError;
use zerocopy::{AsBytes, FromBytes};

/// Short payload: one frame in, one dispatch out, nothing left behind.
#[test]
fn short_payload_round_trips() {
    let (processor, received) = collecting_processor("short");

    processor.send_payload(b"ABCDEF").unwrap();
    drain(&processor);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(&received[0][..], b"ABCDEF");
    assert_eq!(processor.partial_count(), 0);
}

/// Payload sizes straddling every frame boundary, with the frame count the
/// sender must produce for each.
#[test]
fn boundary_sizes_round_trip_with_exact_frame_counts() {
    for size in [1usize, 4063, 4064, 4065, 8128, 8129, 17000] {
        let expected_frames = size.div_ceil(FRAME_BODY);
        assert!(
            expected_frames <= TEST_QUEUE_SLOTS,
            "scenario must fit the test queue"
        );

        let queue = unique_queue("boundary");
        let received = std::sync::Arc::new(Mutex::new(Vec::new()));
        let processor = ChunkedProcessor::new(queue.clone(), {
            let sink = received.clone();
            Box::new(move |message| sink.lock().unwrap().push(message))
        });

        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        processor.send_payload(&payload).unwrap();

        // Count the frames actually sitting in the queue by draining it.
        let mut frames = 0;
        let mut slot = [0u8; outpost_core::wire::SLOT_BYTES];
        while let Some(bytes) = queue
            .timed_receive(&mut slot, Duration::from_millis(20))
            .unwrap()
        {
            frames += 1;
            processor.process_frame(&slot[..bytes]).unwrap();
        }
        assert_eq!(frames, expected_frames, "frame count for size {size}");

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1, "one dispatch for size {size}");
        assert_eq!(&received[0][..], &payload[..], "payload intact for size {size}");
        assert_eq!(processor.partial_count(), 0);
    }
}

/// Empty payload: ok, zero frames, zero dispatches.
#[test]
fn empty_payload_is_a_noop() {
    let (processor, received) = collecting_processor("empty");
    processor.send_payload(b"").unwrap();
    drain(&processor);
    assert!(received.lock().unwrap().is_empty());
    assert_eq!(processor.partial_count(), 0);
}

/// 17000 bytes: five frames at offsets 0, 4064, 8128, 12192, 16256.
#[test]
fn five_frame_payload_offsets() {
    let queue = unique_queue("offsets");
    let processor = ChunkedProcessor::new(queue.clone(), Box::new(|_| {}));
    let payload = vec![b'A'; 17000];
    processor.send_payload(&payload).unwrap();

    let mut offsets = Vec::new();
    let mut slot = [0u8; outpost_core::wire::SLOT_BYTES];
    while let Some(bytes) = queue
        .timed_receive(&mut slot, Duration::from_millis(20))
        .unwrap()
    {
        assert_eq!(bytes, outpost_core::wire::SLOT_BYTES);
        let header =
            outpost_core::wire::FrameHeader::read_from_prefix(&slot[..]).expect("frame header");
        offsets.push(header.offset);
    }
    assert_eq!(offsets, vec![0, 4064, 8128, 12192, 16256]);
}

/// Interleaved frames from two senders, distinguished by sender pid,
/// reassemble into two intact payloads.
#[test]
fn concurrent_senders_reassemble_independently() {
    let (processor, received) = collecting_processor("interleave");

    let payload_a: Vec<u8> = (0..FRAME_BODY * 2 + 17).map(|i| (i % 13) as u8).collect();
    let payload_b: Vec<u8> = (0..FRAME_BODY + 300).map(|i| (i % 7) as u8).collect();

    let frame = |pid: u32, payload: &[u8], offset: usize| {
        ChunkFrame::for_chunk(pid, 1, payload, offset)
            .as_bytes()
            .to_vec()
    };

    // Interleave: a0, b0, a1, b1(last), a2(last)
    processor.process_frame(&frame(111, &payload_a, 0)).unwrap();
    processor.process_frame(&frame(222, &payload_b, 0)).unwrap();
    processor
        .process_frame(&frame(111, &payload_a, FRAME_BODY))
        .unwrap();
    processor
        .process_frame(&frame(222, &payload_b, FRAME_BODY))
        .unwrap();
    processor
        .process_frame(&frame(111, &payload_a, FRAME_BODY * 2))
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(&received[0][..], &payload_b[..]);
    assert_eq!(&received[1][..], &payload_a[..]);
    assert_eq!(processor.partial_count(), 0);
}

/// An abandoned prefix ages out; a younger partial survives the same sweep.
#[test]
fn gc_removes_stale_partials_and_keeps_fresh_ones() {
    let (processor, received) = collecting_processor("gc");
    let payload = vec![1u8; FRAME_BODY * 3 - 100]; // needs 3 chunks

    let frame = |pid: u32, offset: usize| {
        ChunkFrame::for_chunk(pid, 777, &payload, offset)
            .as_bytes()
            .to_vec()
    };

    processor.process_frame(&frame(1, 0)).unwrap();
    std::thread::sleep(Duration::from_millis(10));
    processor.process_frame(&frame(2, 0)).unwrap();
    assert_eq!(processor.partial_count(), 2);

    // The older partial is past 9 ms, the younger is not.
    processor.cleanup_abandoned(Instant::now(), Duration::from_millis(9));
    assert_eq!(processor.partial_count(), 1);

    // Far future: everything is stale.
    processor.cleanup_abandoned(
        Instant::now() + Duration::from_secs(3600),
        Duration::from_secs(1),
    );
    assert_eq!(processor.partial_count(), 0);
    assert!(received.lock().unwrap().is_empty());
}

/// Filling the queue with nobody draining fails the send with QueueFull
/// semantics after bounded retries.
#[test]
fn unserviced_queue_reports_full() {
    let queue = unique_queue("full");
    let processor = ChunkedProcessor::new(queue.clone(), Box::new(|_| {}));

    // One more frame than the queue holds.
    let payload = vec![b'Z'; FRAME_BODY * (TEST_QUEUE_SLOTS + 1)];
    let err = processor.send_payload(&payload).unwrap_err();
    assert!(matches!(
        err,
        outpost_runtime::chunked::SendError::QueueFull
    ));

    // The orphaned prefix is still deliverable and later GC'd.
    drain(&processor);
    assert_eq!(processor.partial_count(), 1);
    processor.cleanup_abandoned(
        Instant::now() + Duration::from_secs(60),
        Duration::from_secs(10),
    );
    assert_eq!(processor.partial_count(), 0);

    // The queue itself stays usable.
    assert!(queue
        .timed_receive(&mut [0u8; 4096], Duration::from_millis(10))
        .unwrap()
        .is_none());
    assert!(matches!(
        queue.try_send(&[0u8; 4096], 0),
        Ok(()) | Err(QueueError::Full)
    ));
}
