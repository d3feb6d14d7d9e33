//! # Session Registry
//!
//! Process-wide table mapping session ids to their emitter. Every
//! component that needs to push unsolicited output to a session (for
//! example an asynchronous pipeline completion) looks the emitter up
//! here.
//!
//! ## Thread Safety:
//! The map is guarded internally; callers never hold an external lock.
//! `cleanup` is the single teardown path: it atomically removes the
//! emitter and completes it exactly once, tolerating ids that are
//! already absent.

use crate::ws::emitter::{Emitter, OutboundFrame};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

pub struct SessionRegistry {
    emitters: RwLock<HashMap<String, Emitter>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            emitters: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new emitter for a session and return it together with
    /// the receiving half for the connection's write loop.
    pub fn create_emitter(
        &self,
        session_id: &str,
    ) -> (Emitter, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (emitter, rx) = Emitter::new(session_id);
        self.emitters
            .write()
            .unwrap()
            .insert(session_id.to_string(), emitter.clone());
        (emitter, rx)
    }

    pub fn get(&self, session_id: &str) -> Option<Emitter> {
        self.emitters.read().unwrap().get(session_id).cloned()
    }

    /// Remove and complete a session's emitter. Removal and completion
    /// happen at most once; a second call (or an unknown id) is a no-op.
    pub fn cleanup(&self, session_id: &str) {
        let removed = self.emitters.write().unwrap().remove(session_id);
        if let Some(emitter) = removed {
            emitter.complete();
        }
    }

    pub fn active_count(&self) -> usize {
        self.emitters.read().unwrap().len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
