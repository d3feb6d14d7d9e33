//! # Configuration Management
//!
//! Loads application configuration from layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables with an `APP_` prefix
//! - `HOST` / `PORT` overrides used by deployment platforms
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables
//! 2. `APP_`-prefixed environment variables (e.g. `APP_SERVER_PORT`)
//! 3. Configuration file (config.toml)
//! 4. Default values

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
    pub collab: CollabConfig,
}

/// Server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio session settings.
///
/// ## Fields:
/// - `finalize_debounce_ms`: Quiet window after a FINISH signal before the
///   recording is merged and transcribed. A fragment arriving inside the
///   window restarts it.
/// - `echo_merged`: When true, the merged recording is echoed back to the
///   client as one binary frame before transcription (debug aid).
/// - `ffmpeg_path`: Binary used for transcoding compressed uploads to WAV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub finalize_debounce_ms: u64,
    pub echo_merged: bool,
    pub ffmpeg_path: String,
}

/// Pipeline stage budgets and knobs.
///
/// ## Fields:
/// - `pivot_lang`: Translation code of the internal processing language.
/// - `rewrite_timeout_secs`: Budget for the query-rewrite call; on expiry
///   the pipeline falls back to searching the raw text.
/// - `search_timeout_secs`: Budget per search query.
/// - `total_timeout_secs`: Outer budget for one message end to end.
/// - `persist_timeout_secs`: Budget per persistence attempt.
/// - `persist_retries`: Extra attempts after a failed persistence call.
/// - `persist_retry_delay_ms`: Fixed delay between persistence attempts.
/// - `search_top_k`: Results requested per query and the cap on merged
///   citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pivot_lang: String,
    pub rewrite_timeout_secs: u64,
    pub search_timeout_secs: u64,
    pub total_timeout_secs: u64,
    pub persist_timeout_secs: u64,
    pub persist_retries: u32,
    pub persist_retry_delay_ms: u64,
    pub search_top_k: usize,
}

/// Base URLs and credentials for the backing services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollabConfig {
    pub stt_base_url: String,
    pub trans_base_url: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub search_base_url: String,
    pub store_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                finalize_debounce_ms: 250,
                echo_merged: false,
                ffmpeg_path: "ffmpeg".to_string(),
            },
            pipeline: PipelineConfig {
                pivot_lang: "ko".to_string(),
                rewrite_timeout_secs: 15,
                search_timeout_secs: 5,
                total_timeout_secs: 65,
                persist_timeout_secs: 5,
                persist_retries: 2,
                persist_retry_delay_ms: 500,
                search_top_k: 5,
            },
            collab: CollabConfig {
                stt_base_url: "http://127.0.0.1:9100".to_string(),
                trans_base_url: "http://127.0.0.1:9101".to_string(),
                llm_base_url: "http://127.0.0.1:11434".to_string(),
                llm_model: "llama3.1:8b".to_string(),
                llm_api_key: None,
                search_base_url: "http://127.0.0.1:9102".to_string(),
                store_base_url: "http://127.0.0.1:9103".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_PIPELINE_PIVOT_LANG=en`: Override the pivot language
    /// - `HOST` / `PORT`: Deployment-platform overrides without the prefix
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.pipeline.total_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Total pipeline timeout must be greater than 0"));
        }

        if self.pipeline.search_top_k == 0 {
            return Err(anyhow::anyhow!("Search top-k must be greater than 0"));
        }

        if self.pipeline.pivot_lang.is_empty() {
            return Err(anyhow::anyhow!("Pivot language cannot be empty"));
        }

        if self.audio.ffmpeg_path.is_empty() {
            return Err(anyhow::anyhow!("ffmpeg path cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.pivot_lang, "ko");
        assert_eq!(config.audio.finalize_debounce_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.pivot_lang.clear();
        assert!(config.validate().is_err());
    }
}
