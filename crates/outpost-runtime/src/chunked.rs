//! Chunked message transfer over the shared queue.
//!
//! Payloads larger than one slot are split into a run of frames on the way
//! out and reassembled per (sender pid, message id) on the way in. Chunks of
//! one message arrive in order because the kernel queue preserves per-sender
//! ordering; the receiver enforces strictly sequential offsets and drops the
//! whole message on any deviation. Abandoned partial messages (a sender died
//! mid-payload, or a full queue orphaned a prefix) are garbage collected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use zerocopy::{AsBytes, FromBytes};

use outpost_core::wire::{ChunkFrame, FrameHeader, FRAME_BODY, FRAME_HEADER_BYTES, SLOT_BYTES};

use crate::queue::{QueueError, SharedQueue};

/// Attempts per frame before a persistently full queue fails the payload.
const SEND_ATTEMPTS: u32 = 5;

/// Pause between attempts against a full queue.
const SEND_RETRY_DELAY: Duration = Duration::from_millis(5);

/// How long one receive waits for a frame before yielding to the caller.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("queue stayed full for {SEND_ATTEMPTS} attempts")]
    QueueFull,

    #[error("queue unavailable: {0}")]
    Ipc(QueueError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("frame of {size} bytes is shorter than the frame header")]
    MalformedFrame { size: usize },

    #[error("sender {sender_pid} message {msg_id}: {reason}")]
    ProtocolViolation {
        sender_pid: u32,
        msg_id: u64,
        reason: &'static str,
    },

    #[error(
        "sender {sender_pid} message {msg_id}: chunk at offset {offset} \
         overruns the frame for declared total {total_size}"
    )]
    Overflow {
        sender_pid: u32,
        msg_id: u64,
        offset: u64,
        total_size: u64,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

// ── Reassembly state ─────────────────────────────────────────────────────────

/// Buffer for one in-flight multi-chunk message.
struct PartialMessage {
    total_size: usize,
    buffer: Vec<u8>,
    last_updated: Instant,
}

impl PartialMessage {
    fn new(total_size: usize, now: Instant) -> Self {
        Self {
            total_size,
            buffer: Vec::with_capacity(total_size),
            last_updated: now,
        }
    }

    /// Appends one chunk and reports completion.
    fn append(&mut self, chunk: &[u8], now: Instant) -> bool {
        self.buffer.extend_from_slice(chunk);
        self.last_updated = now;
        self.buffer.len() == self.total_size
    }
}

/// Invoked with each completed message, on the receiving thread.
pub type MessageHandler = Box<dyn Fn(Bytes) + Send + Sync>;

/// Worker-side hand-off: components that emit payloads capture one of these
/// instead of the processor itself.
pub type PayloadSender = Arc<dyn Fn(&[u8]) -> Result<(), SendError> + Send + Sync>;

// ── Processor ────────────────────────────────────────────────────────────────

pub struct ChunkedProcessor {
    queue: Arc<SharedQueue>,
    process_message: MessageHandler,
    /// sender pid → message id → partial. Receive and GC run on different
    /// threads in the coordinator; the mutex covers that crossing.
    partials: Mutex<HashMap<u32, HashMap<u64, PartialMessage>>>,
    next_msg_id: AtomicU64,
    self_pid: u32,
}

impl ChunkedProcessor {
    pub fn new(queue: Arc<SharedQueue>, process_message: MessageHandler) -> Self {
        Self {
            queue,
            process_message,
            partials: Mutex::new(HashMap::new()),
            next_msg_id: AtomicU64::new(0),
            self_pid: std::process::id(),
        }
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Send one payload as a run of frames. An empty payload is a successful
    /// no-op and puts nothing on the queue. On persistent queue pressure the
    /// whole payload fails; an already-sent prefix is left for the
    /// receiver's garbage collection.
    pub fn send_payload(&self, payload: &[u8]) -> Result<(), SendError> {
        if payload.is_empty() {
            return Ok(());
        }

        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        let mut offset = 0usize;
        while offset < payload.len() {
            let frame = ChunkFrame::for_chunk(self.self_pid, msg_id, payload, offset);
            self.send_frame(frame.as_bytes())?;
            offset += FRAME_BODY.min(payload.len() - offset);
        }

        tracing::trace!(msg_id, size = payload.len(), "payload sent");
        Ok(())
    }

    fn send_frame(&self, slot: &[u8]) -> Result<(), SendError> {
        for attempt in 1..=SEND_ATTEMPTS {
            match self.queue.try_send(slot, 0) {
                Ok(()) => return Ok(()),
                Err(QueueError::Full) if attempt < SEND_ATTEMPTS => {
                    std::thread::sleep(SEND_RETRY_DELAY);
                }
                Err(QueueError::Full) => return Err(SendError::QueueFull),
                Err(other) => return Err(SendError::Ipc(other)),
            }
        }
        Err(SendError::QueueFull)
    }

    // ── Receiving ────────────────────────────────────────────────────────────

    /// Pull one frame off the queue and feed it into reassembly. Returns
    /// without effect when the receive deadline passes.
    pub fn try_receive(&self) -> Result<(), ReceiveError> {
        let mut slot = [0u8; SLOT_BYTES];
        match self.queue.timed_receive(&mut slot, RECEIVE_TIMEOUT)? {
            None => Ok(()),
            Some(size) => self.process_frame(&slot[..size]),
        }
    }

    /// Reassembly entry point for one raw frame image.
    pub fn process_frame(&self, frame: &[u8]) -> Result<(), ReceiveError> {
        if frame.len() < FRAME_HEADER_BYTES {
            return Err(ReceiveError::MalformedFrame { size: frame.len() });
        }
        let header = match FrameHeader::read_from_prefix(frame) {
            Some(header) => header,
            None => return Err(ReceiveError::MalformedFrame { size: frame.len() }),
        };
        let sender_pid = header.sender_pid;
        let msg_id = header.msg_id;
        let total_size = header.total_size as usize;
        let offset = header.offset as usize;

        if total_size == 0 {
            return Err(ReceiveError::ProtocolViolation {
                sender_pid,
                msg_id,
                reason: "chunk declares a zero-length message",
            });
        }

        let completed = {
            let mut partials = self.partials.lock().expect("partial map lock poisoned");
            let per_sender = partials.entry(sender_pid).or_default();
            let now = Instant::now();

            let partial = per_sender
                .entry(msg_id)
                .or_insert_with(|| PartialMessage::new(total_size, now));

            let mut drop_reason = None;
            if partial.total_size != total_size {
                drop_reason = Some(ReceiveError::ProtocolViolation {
                    sender_pid,
                    msg_id,
                    reason: "total size changed mid-message",
                });
            } else if offset != partial.buffer.len() {
                drop_reason = Some(ReceiveError::ProtocolViolation {
                    sender_pid,
                    msg_id,
                    reason: "non-sequential chunk offset",
                });
            }

            // The meaningful chunk length comes from the header, never from
            // the slot length; the body tail is zero fill.
            let chunk_len = total_size.saturating_sub(offset).min(FRAME_BODY);
            if drop_reason.is_none() && chunk_len > frame.len() - FRAME_HEADER_BYTES {
                drop_reason = Some(ReceiveError::Overflow {
                    sender_pid,
                    msg_id,
                    offset: offset as u64,
                    total_size: total_size as u64,
                });
            }

            if let Some(err) = drop_reason {
                per_sender.remove(&msg_id);
                if per_sender.is_empty() {
                    partials.remove(&sender_pid);
                }
                return Err(err);
            }

            let chunk = &frame[FRAME_HEADER_BYTES..FRAME_HEADER_BYTES + chunk_len];
            if partial.append(chunk, now) {
                let finished = per_sender.remove(&msg_id).map(|p| p.buffer);
                if per_sender.is_empty() {
                    partials.remove(&sender_pid);
                }
                finished
            } else {
                None
            }
        };

        // The partial is already gone from the map, so a panicking handler
        // cannot corrupt reassembly state.
        if let Some(buffer) = completed {
            tracing::trace!(sender_pid, msg_id, size = buffer.len(), "message complete");
            (self.process_message)(Bytes::from(buffer));
        }
        Ok(())
    }

    // ── Garbage collection ───────────────────────────────────────────────────

    /// Drop every partial whose last chunk arrived more than `max_age`
    /// before `now`.
    pub fn cleanup_abandoned(&self, now: Instant, max_age: Duration) {
        let mut partials = self.partials.lock().expect("partial map lock poisoned");
        let mut dropped = 0usize;
        partials.retain(|sender_pid, per_sender| {
            per_sender.retain(|msg_id, partial| {
                let stale = now.saturating_duration_since(partial.last_updated) > max_age;
                if stale {
                    tracing::debug!(
                        sender_pid = *sender_pid,
                        msg_id = *msg_id,
                        received = partial.buffer.len(),
                        total = partial.total_size,
                        "dropping abandoned partial message"
                    );
                    dropped += 1;
                }
                !stale
            });
            !per_sender.is_empty()
        });
        if dropped > 0 {
            tracing::debug!(dropped, "abandoned partial messages removed");
        }
    }

    /// In-flight partial messages across all senders.
    pub fn partial_count(&self) -> usize {
        self.partials
            .lock()
            .expect("partial map lock poisoned")
            .values()
            .map(HashMap::len)
            .sum()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
