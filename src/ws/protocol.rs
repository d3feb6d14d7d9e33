//! # WebSocket Wire Protocol
//!
//! Text control frames exchanged with clients, discriminated by a `type`
//! field.
//!
//! ## Message Format:
//! - **Client → Server**: `{"type":"START"}`, `{"type":"CHAT","text":...,
//!   "lang":...,"roomId":...}`, `{"type":"PING"}`, `{"type":"FINISH"}`
//! - **Server → Client**: `{"type":"SYSTEM"|"TRANS"|"CHAT","text":...}`,
//!   `{"type":"PONG","ts":...}`, and the streaming-style envelope
//!   `{"type":"nlp-stream","event":...,"data":{...},"traceId":...}`
//!
//! Unrecognized inbound types deserialize into [`ChatInbound::Unknown`]
//! and are silently ignored; unparsable frames are logged and dropped by
//! the handlers, never fatal to the connection.

use serde::{Deserialize, Serialize};

/// A parsed inbound control frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ChatInbound {
    #[serde(rename = "START")]
    Start,

    #[serde(rename = "CHAT")]
    Chat {
        text: String,
        #[serde(default)]
        lang: Option<String>,
        #[serde(default, rename = "roomId")]
        room_id: Option<String>,
    },

    #[serde(rename = "PING")]
    Ping,

    #[serde(rename = "FINISH")]
    Finish,

    /// Legacy or unrecognized types; routed nowhere.
    #[serde(other)]
    Unknown,
}

/// An outbound text/control frame.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutbound {
    #[serde(rename = "type")]
    pub kind: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl ChatOutbound {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            kind: "SYSTEM",
            text: Some(text.into()),
            ts: None,
        }
    }

    pub fn trans(text: impl Into<String>) -> Self {
        Self {
            kind: "TRANS",
            text: Some(text.into()),
            ts: None,
        }
    }

    pub fn chat(text: impl Into<String>) -> Self {
        Self {
            kind: "CHAT",
            text: Some(text.into()),
            ts: None,
        }
    }

    pub fn pong(ts: i64) -> Self {
        Self {
            kind: "PONG",
            text: None,
            ts: Some(ts),
        }
    }
}

/// The streaming-style envelope used for asynchronous pipeline output.
#[derive(Debug, Clone, Serialize)]
pub struct NlpStreamEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub event: &'static str,
    pub data: serde_json::Value,
    #[serde(rename = "traceId")]
    pub trace_id: String,
}

impl NlpStreamEvent {
    pub fn original_text(text: &str, trace_id: &str) -> Self {
        Self {
            kind: "nlp-stream",
            event: "original_text",
            data: serde_json::json!({ "text": text }),
            trace_id: trace_id.to_string(),
        }
    }

    pub fn error(message: &str, trace_id: &str) -> Self {
        Self {
            kind: "nlp-stream",
            event: "error",
            data: serde_json::json!({ "message": message }),
            trace_id: trace_id.to_string(),
        }
    }
}

/// Audio parameters declared once near connection start, before the
/// binary fragment stream. Also carries session metadata (language, room)
/// that later pipeline stages read from the emitter's attribute bag.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMeta {
    pub mime_type: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub lang: Option<String>,
    pub room_id: Option<String>,
}

impl AudioMeta {
    /// True when at least one known field was present; guards against
    /// treating arbitrary JSON as a meta frame.
    pub fn has_any(&self) -> bool {
        self.mime_type.is_some()
            || self.sample_rate.is_some()
            || self.channels.is_some()
            || self.lang.is_some()
            || self.room_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_inbound_parsing() {
        let msg: ChatInbound =
            serde_json::from_str(r#"{"type":"CHAT","text":"hi","lang":"Eng","roomId":"r1"}"#)
                .unwrap();
        match msg {
            ChatInbound::Chat { text, lang, room_id } => {
                assert_eq!(text, "hi");
                assert_eq!(lang.as_deref(), Some("Eng"));
                assert_eq!(room_id.as_deref(), Some("r1"));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let msg: ChatInbound = serde_json::from_str(r#"{"type":"AUDIO_CHUNK"}"#).unwrap();
        assert!(matches!(msg, ChatInbound::Unknown));
    }

    #[test]
    fn test_outbound_omits_absent_fields() {
        let json = serde_json::to_string(&ChatOutbound::system("hello")).unwrap();
        assert_eq!(json, r#"{"type":"SYSTEM","text":"hello"}"#);

        let json = serde_json::to_string(&ChatOutbound::pong(42)).unwrap();
        assert_eq!(json, r#"{"type":"PONG","ts":42}"#);
    }

    #[test]
    fn test_nlp_stream_envelope_shape() {
        let json =
            serde_json::to_value(NlpStreamEvent::original_text("answer", "sid-1")).unwrap();
        assert_eq!(json["type"], "nlp-stream");
        assert_eq!(json["event"], "original_text");
        assert_eq!(json["data"]["text"], "answer");
        assert_eq!(json["traceId"], "sid-1");
    }

    #[test]
    fn test_audio_meta_guard() {
        let meta: AudioMeta =
            serde_json::from_str(r#"{"mimeType":"audio/webm;codecs=opus","lang":"Kor"}"#).unwrap();
        assert!(meta.has_any());

        let empty: AudioMeta = serde_json::from_str("{}").unwrap();
        assert!(!empty.has_any());
    }
}
