//! # Pipeline Data Model
//!
//! The value types that flow through the translate/retrieve/generate
//! chain: the unit of work itself, the rewritten search plan, deduplicated
//! citations, the generated answer with its token usage, and the persisted
//! conversation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One unit of work submitted to the orchestrator.
///
/// Produced when a CHAT control frame is parsed (or when a finished audio
/// recording has been transcribed); consumed fully by the ordered chain
/// before the next message for the same session begins.
#[derive(Debug, Clone)]
pub struct PipelineMessage {
    /// Original text as the user produced it.
    pub text: String,

    /// Source language as a translation-service code (e.g. "en").
    pub source_lang: String,

    /// Correlation id threaded through the chain (the session id).
    pub trace_id: String,

    /// Destination conversation room.
    pub room_id: String,
}

/// The rewrite stage's output: 2-4 rewritten queries plus optional
/// filters. Falls back to a single-element plan on rewrite failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPlan {
    pub queries: Vec<String>,
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl SearchPlan {
    pub fn of(queries: Vec<String>) -> Self {
        Self {
            queries,
            filters: HashMap::new(),
        }
    }
}

/// One deduplicated search result used as generation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Token accounting for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The generation collaborator's final (non-streamed) answer.
#[derive(Debug, Clone)]
pub struct CompleteAnswer {
    pub text: String,
    pub usage: Option<Usage>,
}

/// A persisted question/answer pair. `created_at` is assigned by the
/// persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub room_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_plan_of_has_no_filters() {
        let plan = SearchPlan::of(vec!["a".into(), "b".into()]);
        assert_eq!(plan.queries.len(), 2);
        assert!(plan.filters.is_empty());
    }

    #[test]
    fn test_conversation_message_uses_camel_case() {
        let msg = ConversationMessage {
            id: "m1".into(),
            question: "q".into(),
            answer: "a".into(),
            room_id: "r1".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"roomId\""));
        assert!(json.contains("\"createdAt\""));
    }
}
