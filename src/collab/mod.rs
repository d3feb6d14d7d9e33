//! # External Collaborators
//!
//! Abstract async interfaces for the remote services the pipeline talks
//! to: speech recognition, translation, query rewriting + answer
//! generation, retrieval, and conversation persistence. Each is specified
//! only at its boundary — an opaque async call with an error contract —
//! and the orchestrator owns every timeout.

pub mod http;
#[cfg(test)]
pub mod mock;

use crate::pipeline::model::{Citation, CompleteAnswer, ConversationMessage, SearchPlan, Usage};
use async_trait::async_trait;
use thiserror::Error;

/// A collaborator call failed.
#[derive(Debug, Error)]
pub enum CollabError {
    /// The request never produced a usable response (transport, 5xx, ...).
    #[error("request failed: {0}")]
    Request(String),

    /// The response arrived but did not carry what we expected.
    #[error("unexpected response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for CollabError {
    fn from(err: reqwest::Error) -> Self {
        CollabError::Request(err.to_string())
    }
}

pub type CollabResult<T> = Result<T, CollabError>;

/// Speech recognition over a finished PCM WAV buffer.
#[async_trait]
pub trait SttClient: Send + Sync {
    async fn recognize(&self, wav: &[u8], lang: &str) -> CollabResult<String>;
}

/// Text translation between two language codes.
#[async_trait]
pub trait TransClient: Send + Sync {
    async fn translate(&self, source: &str, target: &str, text: &str) -> CollabResult<String>;
}

/// Query rewriting and answer generation, with per-trace token
/// accounting.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Rewrite a user question into 2-4 retrieval-friendly queries.
    async fn rewrite_for_search(&self, text: &str, trace_id: &str) -> CollabResult<SearchPlan>;

    /// Produce the final (non-streamed) answer.
    async fn complete_answer(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        trace_id: &str,
    ) -> CollabResult<CompleteAnswer>;

    /// Latest token-usage figures recorded for a trace id.
    fn last_usage(&self, trace_id: &str) -> Option<Usage>;
}

/// Search over the knowledge corpus.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> CollabResult<Vec<Citation>>;
}

/// Best-effort conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_message(
        &self,
        question: &str,
        answer: &str,
        room_id: &str,
    ) -> CollabResult<ConversationMessage>;
}
