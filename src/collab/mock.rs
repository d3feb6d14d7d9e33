//! Counting test doubles for the collaborator interfaces.

use crate::collab::{
    CollabError, CollabResult, ConversationStore, LlmClient, SearchClient, SttClient, TransClient,
};
use crate::pipeline::model::{Citation, CompleteAnswer, ConversationMessage, SearchPlan, Usage};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, ordered record of collaborator activity across mocks.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn citation(id: &str, url: &str) -> Citation {
    Citation {
        id: id.to_string(),
        title: format!("title-{}", id),
        url: url.to_string(),
        snippet: format!("snippet-{}", id),
    }
}

#[derive(Default)]
pub struct MockTransClient {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub log: CallLog,
}

#[async_trait]
impl TransClient for MockTransClient {
    async fn translate(&self, source: &str, target: &str, text: &str) -> CollabResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("translate:{}->{}", source, target));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("[{}]{}", target, text))
    }
}

pub struct MockLlmClient {
    /// Queries returned by rewrite; `None` makes rewrite fail.
    pub rewrite_queries: Option<Vec<String>>,
    pub rewrite_delay: Duration,
    pub answer: String,
    pub answer_delay: Duration,
    pub usage: Option<Usage>,
    pub rewrite_calls: AtomicUsize,
    pub answer_calls: AtomicUsize,
    pub seen_user_prompts: Mutex<Vec<String>>,
    pub log: CallLog,
}

impl MockLlmClient {
    pub fn answering(answer: &str) -> Self {
        Self {
            rewrite_queries: Some(vec![format!("{} rewritten", answer)]),
            rewrite_delay: Duration::ZERO,
            answer: answer.to_string(),
            answer_delay: Duration::ZERO,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            rewrite_calls: AtomicUsize::new(0),
            answer_calls: AtomicUsize::new(0),
            seen_user_prompts: Mutex::new(Vec::new()),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn rewrite_for_search(&self, _text: &str, _trace_id: &str) -> CollabResult<SearchPlan> {
        self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push("rewrite");
        if !self.rewrite_delay.is_zero() {
            tokio::time::sleep(self.rewrite_delay).await;
        }
        match &self.rewrite_queries {
            Some(queries) => Ok(SearchPlan::of(queries.clone())),
            None => Err(CollabError::Response("rewrite unavailable".into())),
        }
    }

    async fn complete_answer(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _trace_id: &str,
    ) -> CollabResult<CompleteAnswer> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push("generate");
        if !self.answer_delay.is_zero() {
            tokio::time::sleep(self.answer_delay).await;
        }
        self.seen_user_prompts
            .lock()
            .unwrap()
            .push(user_prompt.to_string());
        Ok(CompleteAnswer {
            text: self.answer.clone(),
            usage: self.usage,
        })
    }

    fn last_usage(&self, _trace_id: &str) -> Option<Usage> {
        self.usage
    }
}

#[derive(Default)]
pub struct MockSearchClient {
    /// Returned for every query.
    pub results: Vec<Citation>,
    pub calls: AtomicUsize,
    pub seen_queries: Mutex<Vec<String>>,
    pub log: CallLog,
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn search(&self, query: &str, _top_k: usize) -> CollabResult<Vec<Citation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("search:{}", query));
        self.seen_queries.lock().unwrap().push(query.to_string());
        Ok(self.results.clone())
    }
}

#[derive(Default)]
pub struct MockConversationStore {
    /// Number of initial attempts that fail before one succeeds.
    pub fail_first: AtomicUsize,
    pub attempts: AtomicUsize,
    pub log: CallLog,
}

impl MockConversationStore {
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: AtomicUsize::new(n),
            attempts: AtomicUsize::new(0),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl ConversationStore for MockConversationStore {
    async fn create_message(
        &self,
        question: &str,
        answer: &str,
        room_id: &str,
    ) -> CollabResult<ConversationMessage> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.log.push("persist");
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(CollabError::Request("store unavailable".into()));
        }
        Ok(ConversationMessage {
            id: "m1".to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            room_id: room_id.to_string(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Default)]
pub struct MockSttClient {
    /// Transcript returned on success; `None` makes recognition fail.
    pub transcript: Option<String>,
    pub calls: AtomicUsize,
    pub log: CallLog,
}

impl MockSttClient {
    pub fn transcribing(text: &str) -> Self {
        Self {
            transcript: Some(text.to_string()),
            calls: AtomicUsize::new(0),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl SttClient for MockSttClient {
    async fn recognize(&self, _wav: &[u8], _lang: &str) -> CollabResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push("stt");
        match &self.transcript {
            Some(text) => Ok(text.clone()),
            None => Err(CollabError::Request("stt unavailable".into())),
        }
    }
}
