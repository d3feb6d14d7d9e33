//! # Default HTTP Collaborator Clients
//!
//! Thin REST implementations of the collaborator interfaces with
//! configurable base URLs. Vendor-specific wire formats stay out of
//! scope; these clients carry only the minimum JSON the pipeline needs
//! and map transport or shape problems into [`CollabError`].

use crate::collab::{
    CollabError, CollabResult, ConversationStore, LlmClient, SearchClient, SttClient, TransClient,
};
use crate::pipeline::model::{Citation, CompleteAnswer, ConversationMessage, SearchPlan, Usage};
use crate::pipeline::prompt;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

fn check_status(resp: reqwest::Response) -> CollabResult<reqwest::Response> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(CollabError::Request(format!("status {}", resp.status())))
    }
}

// ----- speech recognition -----

pub struct HttpSttClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSttClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct SttResponse {
    text: String,
}

#[async_trait]
impl SttClient for HttpSttClient {
    async fn recognize(&self, wav: &[u8], lang: &str) -> CollabResult<String> {
        let resp = self
            .http
            .post(format!("{}/recognize", self.base_url))
            .query(&[("lang", lang)])
            .header("content-type", "application/octet-stream")
            .body(wav.to_vec())
            .send()
            .await?;
        let body: SttResponse = check_status(resp)?
            .json()
            .await
            .map_err(|e| CollabError::Response(e.to_string()))?;
        Ok(body.text)
    }
}

// ----- translation -----

pub struct HttpTransClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[async_trait]
impl TransClient for HttpTransClient {
    async fn translate(&self, source: &str, target: &str, text: &str) -> CollabResult<String> {
        let resp = self
            .http
            .post(format!("{}/translate", self.base_url))
            .json(&json!({ "source": source, "target": target, "text": text }))
            .send()
            .await?;
        let body: TranslateResponse = check_status(resp)?
            .json()
            .await
            .map_err(|e| CollabError::Response(e.to_string()))?;
        Ok(body.translated_text)
    }
}

// ----- retrieval -----

pub struct HttpSearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Citation>,
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, query: &str, top_k: usize) -> CollabResult<Vec<Citation>> {
        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&json!({ "query": query, "topK": top_k }))
            .send()
            .await?;
        let body: SearchResponse = check_status(resp)?
            .json()
            .await
            .map_err(|e| CollabError::Response(e.to_string()))?;
        Ok(body.results)
    }
}

// ----- rewrite & generation -----

pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    usage: Mutex<HashMap<String, Usage>>,
}

impl HttpLlmClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// One chat-completion round trip; records the returned usage under
    /// the trace id.
    async fn chat(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        trace_id: &str,
    ) -> CollabResult<(String, Option<Usage>)> {
        let mut req = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system_prompt },
                    { "role": "user", "content": user_prompt },
                ],
            }))
            .send()
            .await?;
        let body: ChatCompletionResponse = check_status(resp)?
            .json()
            .await
            .map_err(|e| CollabError::Response(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CollabError::Response("no choices in completion".into()))?;

        let usage = body.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        if let Some(u) = usage {
            self.usage.lock().unwrap().insert(trace_id.to_string(), u);
        }
        Ok((content, usage))
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Extract the query list from a rewrite completion. Accepts either a
/// bare JSON array of strings or an object with a `queries` field.
fn parse_rewrite_queries(content: &str) -> Option<Vec<String>> {
    let trimmed = content.trim();
    if let Ok(queries) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Some(queries);
    }
    #[derive(Deserialize)]
    struct Wrapped {
        queries: Vec<String>,
    }
    serde_json::from_str::<Wrapped>(trimmed).map(|w| w.queries).ok()
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn rewrite_for_search(&self, text: &str, trace_id: &str) -> CollabResult<SearchPlan> {
        let (content, _) = self
            .chat(prompt::rewrite_instruction(), text, trace_id)
            .await?;
        let queries = parse_rewrite_queries(&content)
            .ok_or_else(|| CollabError::Response("rewrite output was not a query list".into()))?;
        debug!("[{}] rewrite produced {} queries", trace_id, queries.len());
        Ok(SearchPlan::of(queries))
    }

    async fn complete_answer(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        trace_id: &str,
    ) -> CollabResult<CompleteAnswer> {
        let (text, usage) = self.chat(system_prompt, user_prompt, trace_id).await?;
        Ok(CompleteAnswer { text, usage })
    }

    fn last_usage(&self, trace_id: &str) -> Option<Usage> {
        self.usage.lock().unwrap().get(trace_id).copied()
    }
}

// ----- persistence -----

pub struct HttpConversationStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpConversationStore {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    async fn create_message(
        &self,
        question: &str,
        answer: &str,
        room_id: &str,
    ) -> CollabResult<ConversationMessage> {
        let resp = self
            .http
            .post(format!("{}/rooms/{}/messages", self.base_url, room_id))
            .json(&json!({ "question": question, "answer": answer }))
            .send()
            .await?;
        check_status(resp)?
            .json()
            .await
            .map_err(|e| CollabError::Response(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rewrite_queries_accepts_both_shapes() {
        assert_eq!(
            parse_rewrite_queries(r#"["a", "b"]"#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            parse_rewrite_queries(r#"{"queries": ["x"]}"#).unwrap(),
            vec!["x".to_string()]
        );
        assert!(parse_rewrite_queries("not json at all").is_none());
    }
}
