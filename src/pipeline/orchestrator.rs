//! # Pipeline Orchestrator
//!
//! Runs one inbound message through the staged chain:
//! echo -> forward translate -> query rewrite -> retrieval -> answer
//! generation -> back-translate -> deliver & persist.
//!
//! ## Containment:
//! The whole chain is wrapped in a single outer timeout. Any stage error
//! or the outer timeout becomes a structured `nlp-stream` error event for
//! the session; the connection is never torn down from here. Persistence
//! is fire-and-forget with bounded retries, so a store outage never
//! surfaces as a protocol error.
//!
//! The caller (the per-session worker in `ws::chat`, or the audio
//! finalizer) awaits [`Orchestrator::run`] to completion, which is what
//! gives each session its messages-settle-in-arrival-order guarantee.

use crate::collab::{ConversationStore, LlmClient, SearchClient, TransClient};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::model::{Citation, PipelineMessage, SearchPlan};
use crate::pipeline::prompt;
use crate::ws::emitter::Emitter;
use crate::ws::protocol::{ChatOutbound, NlpStreamEvent};
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Queries taken from a search plan and the fan-out width of retrieval.
const SEARCH_FAN_OUT: usize = 2;

pub struct Orchestrator {
    trans: Arc<dyn TransClient>,
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchClient>,
    store: Arc<dyn ConversationStore>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        trans: Arc<dyn TransClient>,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchClient>,
        store: Arc<dyn ConversationStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            trans,
            llm,
            search,
            store,
            config,
        }
    }

    /// Run one message through the chain, start to settle.
    ///
    /// Never returns an error: timeouts and stage failures are reported
    /// to the session and absorbed here.
    pub async fn run(&self, msg: PipelineMessage, emitter: &Emitter) {
        let budget = Duration::from_secs(self.config.total_timeout_secs);
        match timeout(budget, self.run_chain(&msg, emitter)).await {
            Ok(Ok(())) => {
                debug!("[{}] pipeline chain settled", msg.trace_id);
            }
            Ok(Err(err)) => {
                warn!("[{}] pipeline chain failed: {}", msg.trace_id, err);
                emitter.emit_event(&NlpStreamEvent::error(&err.to_string(), &msg.trace_id));
            }
            Err(_) => {
                let err = PipelineError::Timeout { stage: "pipeline" };
                warn!(
                    "[{}] pipeline chain exceeded {}s: {}",
                    msg.trace_id, self.config.total_timeout_secs, err
                );
                emitter.emit_event(&NlpStreamEvent::error(&err.to_string(), &msg.trace_id));
            }
        }
    }

    async fn run_chain(
        &self,
        msg: &PipelineMessage,
        emitter: &Emitter,
    ) -> Result<(), PipelineError> {
        // Echo the raw input back to the session; non-blocking enqueue.
        emitter.emit(&ChatOutbound::chat(&msg.text));

        // Forward translate into the pivot language. Identity and blank
        // inputs short-circuit without a remote call; the single result
        // feeds both the translated-input echo and retrieval.
        let pivot = self.config.pivot_lang.as_str();
        let same_lang = msg.source_lang == pivot;
        let pivot_text = if same_lang || msg.text.trim().is_empty() {
            msg.text.clone()
        } else {
            let translated = self
                .trans
                .translate(&msg.source_lang, pivot, &msg.text)
                .await
                .map_err(|e| PipelineError::collaborator("translate", e))?;
            emitter.emit(&ChatOutbound::trans(&translated));
            translated
        };

        let plan = self.rewrite_or_fallback(&pivot_text, msg, emitter).await;
        let citations = self.retrieve(&plan).await;

        let user_prompt = prompt::user_context_prompt(&pivot_text, &citations);
        let answer = self
            .llm
            .complete_answer(prompt::system_instruction(), &user_prompt, &msg.trace_id)
            .await
            .map_err(|e| PipelineError::collaborator("generate", e))?;

        if let Some(usage) = self.llm.last_usage(&msg.trace_id) {
            info!(
                "[{}] generation used {} tokens ({} prompt, {} completion)",
                msg.trace_id, usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        // Back-translate into the user's language; skipped for the
        // identity case.
        let localized = if same_lang {
            answer.text
        } else {
            self.trans
                .translate(pivot, &msg.source_lang, &answer.text)
                .await
                .map_err(|e| PipelineError::collaborator("translate", e))?
        };

        emitter.emit_event(&NlpStreamEvent::original_text(&localized, &msg.trace_id));

        self.spawn_persist(
            msg.text.clone(),
            localized,
            msg.room_id.clone(),
            msg.trace_id.clone(),
        );
        Ok(())
    }

    /// Query rewrite with its own budget. Timeout or failure degrades to
    /// a single-query plan carrying the pivot text verbatim, with a
    /// non-fatal notice to the session.
    async fn rewrite_or_fallback(
        &self,
        pivot_text: &str,
        msg: &PipelineMessage,
        emitter: &Emitter,
    ) -> SearchPlan {
        let budget = Duration::from_secs(self.config.rewrite_timeout_secs);
        match timeout(budget, self.llm.rewrite_for_search(pivot_text, &msg.trace_id)).await {
            Ok(Ok(plan)) if !plan.queries.is_empty() => plan,
            Ok(Ok(_)) => {
                warn!("[{}] rewrite returned no queries", msg.trace_id);
                SearchPlan::of(vec![pivot_text.to_string()])
            }
            Ok(Err(err)) => {
                warn!("[{}] rewrite failed: {}", msg.trace_id, err);
                emitter.emit_event(&NlpStreamEvent::error(
                    "query rewrite unavailable, searching the raw text",
                    &msg.trace_id,
                ));
                SearchPlan::of(vec![pivot_text.to_string()])
            }
            Err(_) => {
                warn!(
                    "[{}] rewrite exceeded {}s budget",
                    msg.trace_id, self.config.rewrite_timeout_secs
                );
                emitter.emit_event(&NlpStreamEvent::error(
                    "query rewrite timed out, searching the raw text",
                    &msg.trace_id,
                ));
                SearchPlan::of(vec![pivot_text.to_string()])
            }
        }
    }

    /// Fan out over the first two plan queries with bounded concurrency.
    /// A failed or timed-out query contributes nothing; zero citations is
    /// a valid outcome.
    async fn retrieve(&self, plan: &SearchPlan) -> Vec<Citation> {
        let top_k = self.config.search_top_k;
        let per_query = Duration::from_secs(self.config.search_timeout_secs);
        let queries: Vec<String> = plan.queries.iter().take(SEARCH_FAN_OUT).cloned().collect();

        let mut hits = stream::iter(queries.into_iter().map(|query| {
            let search = Arc::clone(&self.search);
            async move {
                match timeout(per_query, search.search(&query, top_k)).await {
                    Ok(Ok(results)) => results,
                    Ok(Err(err)) => {
                        warn!("search for '{}' failed: {}", query, err);
                        Vec::new()
                    }
                    Err(_) => {
                        warn!("search for '{}' timed out", query);
                        Vec::new()
                    }
                }
            }
        }))
        .buffer_unordered(SEARCH_FAN_OUT);

        let mut raw = Vec::new();
        while let Some(results) = hits.next().await {
            raw.extend(results);
        }
        dedup_citations(raw, top_k)
    }

    /// Best-effort persistence, detached from the chain. Bounded retries
    /// with a fixed delay; final failure is logged and absorbed.
    fn spawn_persist(&self, question: String, answer: String, room_id: String, trace_id: String) {
        let store = Arc::clone(&self.store);
        let attempts = self.config.persist_retries + 1;
        let per_attempt = Duration::from_secs(self.config.persist_timeout_secs);
        let delay = Duration::from_millis(self.config.persist_retry_delay_ms);

        tokio::spawn(async move {
            for attempt in 1..=attempts {
                match timeout(per_attempt, store.create_message(&question, &answer, &room_id)).await
                {
                    Ok(Ok(record)) => {
                        debug!("[{}] persisted conversation message {}", trace_id, record.id);
                        return;
                    }
                    Ok(Err(err)) => {
                        warn!(
                            "[{}] persist attempt {}/{} failed: {}",
                            trace_id, attempt, attempts, err
                        );
                    }
                    Err(_) => {
                        warn!(
                            "[{}] persist attempt {}/{} timed out",
                            trace_id, attempt, attempts
                        );
                    }
                }
                if attempt < attempts {
                    sleep(delay).await;
                }
            }
            warn!(
                "[{}] giving up on persistence after {} attempts",
                trace_id, attempts
            );
        });
    }
}

/// Deduplicate citations by url (by id when the url is blank), keeping
/// first-seen order, capped at `cap` entries.
pub(crate) fn dedup_citations(raw: Vec<Citation>, cap: usize) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for citation in raw {
        let key = if citation.url.trim().is_empty() {
            format!("id:{}", citation.id)
        } else {
            format!("url:{}", citation.url)
        };
        if seen.insert(key) {
            out.push(citation);
            if out.len() == cap {
                break;
            }
        }
    }
    out
}
