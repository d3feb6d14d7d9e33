//! # Session Emitter
//!
//! Per-connection outbound sink. Many pipeline stages enqueue frames from
//! any task; exactly one transport write loop drains them. The channel is
//! unbounded but monitored: enqueueing is non-blocking, and once the
//! emitter has completed, further enqueues are silent no-ops rather than
//! errors.
//!
//! The emitter also carries a small attribute bag for per-session
//! metadata discovered mid-protocol (declared language, room id, MIME
//! type) so later pipeline stages can read it without re-parsing frames.

use crate::ws::protocol::{ChatOutbound, NlpStreamEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

/// One frame queued for the transport write loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Terminal marker; the write loop closes the connection on receipt.
    Complete,
}

struct EmitterInner {
    session_id: String,
    tx: mpsc::UnboundedSender<OutboundFrame>,
    completed: AtomicBool,
    attributes: Mutex<HashMap<String, String>>,
}

/// Cheaply cloneable handle to one session's outbound queue.
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

impl Emitter {
    /// Create an emitter plus the single-consumer receiving half for the
    /// connection's write loop.
    pub fn new(session_id: &str) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Self {
            inner: Arc::new(EmitterInner {
                session_id: session_id.to_string(),
                tx,
                completed: AtomicBool::new(false),
                attributes: Mutex::new(HashMap::new()),
            }),
        };
        (emitter, rx)
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Enqueue a text frame. No-op after completion or consumer loss.
    pub fn send_text(&self, payload: impl Into<String>) {
        self.push(OutboundFrame::Text(payload.into()));
    }

    /// Enqueue a binary frame. No-op after completion or consumer loss.
    pub fn send_binary(&self, payload: Vec<u8>) {
        self.push(OutboundFrame::Binary(payload));
    }

    /// Serialize and enqueue an outbound control frame.
    pub fn emit(&self, outbound: &ChatOutbound) {
        self.send_json(outbound);
    }

    /// Serialize and enqueue a streaming-envelope event.
    pub fn emit_event(&self, event: &NlpStreamEvent) {
        self.send_json(event);
    }

    fn send_json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.send_text(json),
            Err(err) => warn!(
                "[{}] dropping unserializable outbound frame: {}",
                self.session_id(),
                err
            ),
        }
    }

    /// Complete the emitter. Idempotent: only the first call enqueues the
    /// terminal marker; every later call (and every later send) is a
    /// no-op.
    pub fn complete(&self) {
        if self
            .inner
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let _ = self.inner.tx.send(OutboundFrame::Complete);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    fn push(&self, frame: OutboundFrame) {
        if self.is_completed() {
            return;
        }
        // The receiver may already be gone on an abrupt disconnect; that
        // is a drop, not an error.
        let _ = self.inner.tx.send(frame);
    }

    // ----- attribute bag -----

    pub fn set_attr(&self, key: &str, value: impl Into<String>) {
        self.inner
            .attributes
            .lock()
            .unwrap()
            .insert(key.to_string(), value.into());
    }

    pub fn attr(&self, key: &str) -> Option<String> {
        self.inner.attributes.lock().unwrap().get(key).cloned()
    }

    pub fn remove_attr(&self, key: &str) {
        self.inner.attributes.lock().unwrap().remove(key);
    }

    pub fn clear_attrs(&self) {
        self.inner.attributes.lock().unwrap().clear();
    }
}

/// Attribute keys stashed by the audio meta frame.
pub mod attrs {
    pub const LANG: &str = "lang";
    pub const ROOM_ID: &str = "roomId";
    pub const MIME_TYPE: &str = "mimeType";
}
