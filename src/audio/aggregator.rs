//! # Audio Framing & Aggregation
//!
//! Binary audio fragments arrive in arbitrary order, each prefixed with a
//! 4-byte big-endian sequence number assigned by the sender. The
//! aggregator reorders them by sequence number and merges them into one
//! byte stream on finish.
//!
//! ## Guarantees:
//! - Byte-order correctness only: concatenating container fragments does
//!   not make the result a valid media container. The transcode step
//!   downstream absorbs that.
//! - `merge()` is consume-once: the first call flips the closed flag and
//!   returns the concatenation, every later call returns empty.
//! - Duplicate sequence numbers keep the first payload received.

use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Length of the sequence-number header on every binary frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// Split a wire frame into `(sequence, payload)`.
///
/// Frames shorter than the 4-byte header are invalid and yield `None`;
/// the caller logs and drops them without failing the session.
pub fn decode_frame(frame: &[u8]) -> Option<(u32, &[u8])> {
    if frame.len() < FRAME_HEADER_LEN {
        return None;
    }
    let seq = BigEndian::read_u32(&frame[..FRAME_HEADER_LEN]);
    Some((seq, &frame[FRAME_HEADER_LEN..]))
}

/// Build an outbound frame in the same `[u32 seq][payload]` framing.
pub fn encode_frame(seq: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; FRAME_HEADER_LEN + payload.len()];
    BigEndian::write_u32(&mut out[..FRAME_HEADER_LEN], seq);
    out[FRAME_HEADER_LEN..].copy_from_slice(payload);
    out
}

/// Per-session reorder buffer for sequence-tagged audio fragments.
///
/// ## Thread Safety:
/// Safe for concurrent use from multiple connection-handling tasks: the
/// fragment map is mutex-guarded internally and the closed flag is a
/// compare-and-swap, so callers never hold an external lock.
pub struct AudioAggregator {
    fragments: Mutex<BTreeMap<u32, Vec<u8>>>,
    closed: AtomicBool,
    total_bytes: AtomicU64,
}

impl AudioAggregator {
    pub fn new() -> Self {
        Self {
            fragments: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            total_bytes: AtomicU64::new(0),
        }
    }

    /// Insert a fragment. First writer for a sequence number wins;
    /// duplicates and post-close inserts are no-ops.
    pub fn add(&self, seq: u32, payload: Vec<u8>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut fragments = self.fragments.lock().unwrap();
        if !fragments.contains_key(&seq) {
            self.total_bytes
                .fetch_add(payload.len() as u64, Ordering::Relaxed);
            fragments.insert(seq, payload);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Total payload bytes accepted so far.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.lock().unwrap().len()
    }

    /// Atomic close-and-merge.
    ///
    /// Flips the closed flag and concatenates payloads in ascending
    /// sequence order, releasing the per-fragment storage. A second call
    /// returns an empty buffer: merge is single-shot.
    pub fn merge(&self) -> Vec<u8> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Vec::new();
        }

        let fragments = std::mem::take(&mut *self.fragments.lock().unwrap());
        let mut merged = Vec::with_capacity(self.total_bytes() as usize);
        for payload in fragments.into_values() {
            merged.extend_from_slice(&payload);
        }
        merged
    }
}

impl Default for AudioAggregator {
    fn default() -> Self {
        Self::new()
    }
}
