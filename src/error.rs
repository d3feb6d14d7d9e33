//! # Error Handling
//!
//! Error taxonomy for the per-message pipeline. A pipeline error is always
//! contained at the chain boundary: it is converted into a structured
//! error event for the client and never tears down the connection. The
//! application boundary (startup, config) uses `anyhow` instead.

use thiserror::Error;

/// Errors raised while running a message through the staged pipeline.
///
/// ## Containment:
/// Every variant is caught by the orchestrator's outer wrapper, reported
/// to the session as an `nlp-stream`/`error` event, and then dropped. The
/// session itself stays open.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A collaborator call exceeded its stage timeout.
    #[error("{stage} timed out")]
    Timeout { stage: &'static str },

    /// A collaborator call failed (non-timeout).
    #[error("{stage} failed: {message}")]
    Collaborator { stage: &'static str, message: String },

    /// A protocol precondition was not met (e.g. audio finished without a
    /// declared language). Terminal for the operation, not the session.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The external transcode tool exited abnormally.
    #[error("transcode failed: {0}")]
    Transcode(String),
}

impl PipelineError {
    /// Shorthand for wrapping a collaborator failure with its stage name.
    pub fn collaborator(stage: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Collaborator {
            stage,
            message: err.to_string(),
        }
    }
}
