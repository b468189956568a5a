//! Outpost wire format — the frame layout crossing the shared queue.
//!
//! Every slot pushed through the queue is exactly `SLOT_BYTES` long: a
//! 32-byte `FrameHeader` followed by `FRAME_BODY` bytes of chunk body. Only
//! `min(total_size - offset, FRAME_BODY)` bytes of the body are meaningful;
//! the receiver slices with the header fields and never trusts the slot
//! length. The queue never leaves the host, so fields are native byte order.
//!
//! All types are #[repr(C, packed)] for deterministic layout and use
//! zerocopy derives for safe, allocation-free serialization. There is no
//! unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Frame layout ─────────────────────────────────────────────────────────────

/// Size of one queue slot on the wire.
pub const SLOT_BYTES: usize = 4096;

/// Size of the frame header.
pub const FRAME_HEADER_BYTES: usize = 32;

/// Bytes of chunk body carried per slot.
pub const FRAME_BODY: usize = SLOT_BYTES - FRAME_HEADER_BYTES;

/// Describes one chunk of a (possibly multi-chunk) coordinator message.
///
/// The receiver can locate, order, and bound a chunk before touching a
/// single byte of its body.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// OS process id of the sending worker.
    pub sender_pid: u32,

    /// Bit flags. Reserved, must be zero.
    pub flags: u32,

    /// Per-sender monotonically increasing message id. Unique until the
    /// message completes reassembly or is abandoned.
    pub msg_id: u64,

    /// Full reassembled length of the message this chunk belongs to.
    pub total_size: u64,

    /// Byte offset of this chunk within the message. Consecutive chunks of
    /// one message carry strictly increasing, gap-free offsets.
    pub offset: u64,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; FRAME_HEADER_BYTES]);

/// A full slot image: header plus body. The tail of `body` past the
/// meaningful length is zero-filled.
#[derive(AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct ChunkFrame {
    pub header: FrameHeader,
    pub body: [u8; FRAME_BODY],
}

assert_eq_size!(ChunkFrame, [u8; SLOT_BYTES]);

impl ChunkFrame {
    /// Compose one frame for the chunk of `payload` starting at `offset`.
    pub fn for_chunk(sender_pid: u32, msg_id: u64, payload: &[u8], offset: usize) -> Self {
        let chunk = &payload[offset..(offset + FRAME_BODY).min(payload.len())];
        let mut frame = ChunkFrame {
            header: FrameHeader {
                sender_pid,
                flags: 0,
                msg_id,
                total_size: payload.len() as u64,
                offset: offset as u64,
            },
            body: [0u8; FRAME_BODY],
        };
        frame.body[..chunk.len()].copy_from_slice(chunk);
        frame
    }
}

// ── Endpoint hashes ──────────────────────────────────────────────────────────

/// Stable 64-bit identity for an HTTP endpoint, derived from its URL.
///
/// Workers key `SendEndpointPayload` commands by this hash and the
/// coordinator's transport resolves it back to an open connection, so both
/// sides must compute it the same way for the lifetime of the queue.
pub fn endpoint_hash(url: &str) -> u64 {
    let digest = blake3::hash(url.as_bytes());
    let mut eight = [0u8; 8];
    eight.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(eight)
}

// ── Tests ────────────────────────────────────────────────────────────────────
