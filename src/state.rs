//! # Application State Management
//!
//! Shared state handed to every connection handler: the session registry,
//! the pipeline orchestrator, and the audio-side collaborators. Everything
//! here is behind `Arc`, so cloning the state for each worker is cheap and
//! all handlers observe the same registry and collaborators.

use crate::audio::finalize::AudioFinalizer;
use crate::audio::transcode::{FfmpegTranscoder, Transcoder};
use crate::collab::http::{
    HttpConversationStore, HttpLlmClient, HttpSearchClient, HttpSttClient, HttpTransClient,
};
use crate::collab::{ConversationStore, LlmClient, SearchClient, SttClient, TransClient};
use crate::config::AppConfig;
use crate::pipeline::orchestrator::Orchestrator;
use crate::ws::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Instant;

/// The abstract collaborator set the pipeline runs against.
pub struct Collaborators {
    pub stt: Arc<dyn SttClient>,
    pub trans: Arc<dyn TransClient>,
    pub llm: Arc<dyn LlmClient>,
    pub search: Arc<dyn SearchClient>,
    pub store: Arc<dyn ConversationStore>,
}

impl Collaborators {
    /// Build the HTTP-backed collaborator set from configuration. One
    /// shared connection pool serves all of them.
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::new();
        Self {
            stt: Arc::new(HttpSttClient::new(http.clone(), &config.collab.stt_base_url)),
            trans: Arc::new(HttpTransClient::new(
                http.clone(),
                &config.collab.trans_base_url,
            )),
            llm: Arc::new(HttpLlmClient::new(
                http.clone(),
                &config.collab.llm_base_url,
                &config.collab.llm_model,
                config.collab.llm_api_key.clone(),
            )),
            search: Arc::new(HttpSearchClient::new(
                http.clone(),
                &config.collab.search_base_url,
            )),
            store: Arc::new(HttpConversationStore::new(
                http,
                &config.collab.store_base_url,
            )),
        }
    }
}

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<SessionRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub finalizer: Arc<AudioFinalizer>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the full production state from configuration.
    pub fn new(config: AppConfig) -> Self {
        let collaborators = Collaborators::from_config(&config);
        let transcoder: Arc<dyn Transcoder> =
            Arc::new(FfmpegTranscoder::new(config.audio.ffmpeg_path.clone()));
        Self::with_collaborators(config, collaborators, transcoder)
    }

    /// Assemble state around an explicit collaborator set. Production
    /// startup and tests share this wiring.
    pub fn with_collaborators(
        config: AppConfig,
        collaborators: Collaborators,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            collaborators.trans,
            collaborators.llm,
            collaborators.search,
            collaborators.store,
            config.pipeline.clone(),
        ));
        let finalizer = Arc::new(AudioFinalizer::new(
            collaborators.stt,
            transcoder,
            Arc::clone(&orchestrator),
            config.audio.echo_merged,
        ));
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            orchestrator,
            finalizer,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
