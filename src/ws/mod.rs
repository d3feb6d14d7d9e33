//! # WebSocket Session Layer
//!
//! The transport-facing side of the protocol: the wire types, the
//! per-session emitter and registry, and the two connection actors
//! (`/ws/chat` for text, `/ws/audio` for recordings).

pub mod audio;
pub mod chat;
pub mod emitter;
pub mod protocol;
pub mod registry;
