//! # Audio Finalization
//!
//! Runs the terminal part of an audio session after the debounce window
//! closes: merge the aggregator, transcode if the declared MIME type is a
//! compressed container, recognize speech, and feed the transcript into
//! the translate/retrieve/generate chain. Every terminal outcome, happy
//! or not, completes the emitter so the write loop closes the connection.

use crate::audio::aggregator::{encode_frame, AudioAggregator};
use crate::audio::transcode::{needs_transcode, Transcoder};
use crate::collab::SttClient;
use crate::error::PipelineError;
use crate::lang::Lang;
use crate::pipeline::model::PipelineMessage;
use crate::pipeline::orchestrator::Orchestrator;
use crate::ws::emitter::{attrs, Emitter};
use crate::ws::protocol::ChatOutbound;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

pub struct AudioFinalizer {
    stt: Arc<dyn SttClient>,
    transcoder: Arc<dyn Transcoder>,
    orchestrator: Arc<Orchestrator>,
    echo_merged: bool,
}

impl AudioFinalizer {
    pub fn new(
        stt: Arc<dyn SttClient>,
        transcoder: Arc<dyn Transcoder>,
        orchestrator: Arc<Orchestrator>,
        echo_merged: bool,
    ) -> Self {
        Self {
            stt,
            transcoder,
            orchestrator,
            echo_merged,
        }
    }

    /// Merge, transcode, recognize, and run the chain for one finished
    /// recording. Precondition failures (no language, no audio) and
    /// collaborator failures surface as a single SYSTEM message; nothing
    /// propagates past here, and the emitter always completes.
    pub async fn process_final(&self, emitter: &Emitter, aggregator: &AudioAggregator) {
        if let Err(err) = self.finish_chain(emitter, aggregator).await {
            warn!("[{}] finish failed: {}", emitter.session_id(), err);
            emitter.emit(&ChatOutbound::system(user_message(&err)));
        }
        emitter.complete();
    }

    async fn finish_chain(
        &self,
        emitter: &Emitter,
        aggregator: &AudioAggregator,
    ) -> Result<(), PipelineError> {
        let session_id = emitter.session_id().to_string();

        let lang_attr = emitter
            .attr(attrs::LANG)
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Precondition(
                    "language required: declare lang before finishing the recording".into(),
                )
            })?;
        let lang = Lang::from_client_code(&lang_attr).ok_or_else(|| {
            PipelineError::Precondition(format!("unsupported language: {}", lang_attr))
        })?;

        let merged = aggregator.merge();
        if merged.is_empty() {
            return Err(PipelineError::Precondition("no recorded audio".into()));
        }
        info!("[{}] merged recording: {} bytes", session_id, merged.len());

        if self.echo_merged {
            emitter.send_binary(encode_frame(0, &merged));
        }

        let mime = emitter.attr(attrs::MIME_TYPE);
        let wav = if needs_transcode(mime.as_deref()) {
            let transcoder = Arc::clone(&self.transcoder);
            task::spawn_blocking(move || transcoder.to_pcm_wav_16k_mono(&merged))
                .await
                .map_err(|e| PipelineError::Transcode(format!("task failed: {}", e)))?
                .map_err(|e| PipelineError::Transcode(e.to_string()))?
        } else {
            merged
        };

        let transcript = self
            .stt
            .recognize(&wav, lang.speech_code())
            .await
            .map_err(|e| PipelineError::collaborator("speech recognition", e))?;
        if transcript.trim().is_empty() {
            return Err(PipelineError::Precondition("no speech recognized".into()));
        }
        info!("[{}] transcript: {}", session_id, transcript);
        emitter.emit(&ChatOutbound::trans(&transcript));

        let msg = PipelineMessage {
            text: transcript,
            source_lang: lang.translation_code().to_string(),
            trace_id: session_id,
            room_id: emitter
                .attr(attrs::ROOM_ID)
                .unwrap_or_else(|| "default".to_string()),
        };
        self.orchestrator.run(msg, emitter).await;
        Ok(())
    }
}

/// Text shown to the user for a failed finish. Precondition messages are
/// already user-facing; tool failures get a generic line.
fn user_message(err: &PipelineError) -> String {
    match err {
        PipelineError::Precondition(msg) => msg.clone(),
        PipelineError::Transcode(_) => "audio transcoding failed".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::mock::{
        MockConversationStore, MockLlmClient, MockSearchClient, MockSttClient, MockTransClient,
    };
    use crate::config::PipelineConfig;
    use crate::ws::emitter::OutboundFrame;
    use anyhow::anyhow;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    struct PassthroughTranscoder;

    impl Transcoder for PassthroughTranscoder {
        fn to_pcm_wav_16k_mono(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
            Ok(input.to_vec())
        }
    }

    struct FailingTranscoder;

    impl Transcoder for FailingTranscoder {
        fn to_pcm_wav_16k_mono(&self, _input: &[u8]) -> anyhow::Result<Vec<u8>> {
            Err(anyhow!("exit=1"))
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            pivot_lang: "ko".to_string(),
            rewrite_timeout_secs: 15,
            search_timeout_secs: 5,
            total_timeout_secs: 65,
            persist_timeout_secs: 5,
            persist_retries: 2,
            persist_retry_delay_ms: 500,
            search_top_k: 5,
        }
    }

    struct Fixture {
        stt: Arc<MockSttClient>,
        trans: Arc<MockTransClient>,
        llm: Arc<MockLlmClient>,
        finalizer: AudioFinalizer,
    }

    fn fixture(stt: MockSttClient, transcoder: Arc<dyn Transcoder>) -> Fixture {
        let stt = Arc::new(stt);
        let trans = Arc::new(MockTransClient::default());
        let llm = Arc::new(MockLlmClient::answering("answer"));
        let orchestrator = Arc::new(Orchestrator::new(
            trans.clone(),
            llm.clone(),
            Arc::new(MockSearchClient::default()),
            Arc::new(MockConversationStore::default()),
            test_config(),
        ));
        let finalizer = AudioFinalizer::new(stt.clone(), transcoder, orchestrator, false);
        Fixture {
            stt,
            trans,
            llm,
            finalizer,
        }
    }

    fn text_frames(rx: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Text(json) = frame {
                frames.push(json);
            }
        }
        frames
    }

    #[tokio::test]
    async fn test_finish_without_language_is_terminal() {
        let f = fixture(
            MockSttClient::transcribing("hello"),
            Arc::new(PassthroughTranscoder),
        );
        let (emitter, mut rx) = Emitter::new("s1");
        let aggregator = AudioAggregator::new();
        aggregator.add(0, b"audio".to_vec());

        f.finalizer.process_final(&emitter, &aggregator).await;

        let frames = text_frames(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("language required"));
        assert!(emitter.is_completed());
        // No collaborator was touched.
        assert_eq!(f.stt.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.trans.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.llm.answer_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finish_with_no_audio_is_terminal() {
        let f = fixture(
            MockSttClient::transcribing("hello"),
            Arc::new(PassthroughTranscoder),
        );
        let (emitter, mut rx) = Emitter::new("s1");
        emitter.set_attr(attrs::LANG, "Eng");

        f.finalizer
            .process_final(&emitter, &AudioAggregator::new())
            .await;

        let frames = text_frames(&mut rx);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("no recorded audio"));
        assert_eq!(f.stt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wav_upload_skips_transcoding_and_runs_the_chain() {
        let f = fixture(
            MockSttClient::transcribing("hello"),
            // Would fail if invoked.
            Arc::new(FailingTranscoder),
        );
        let (emitter, mut rx) = Emitter::new("s1");
        emitter.set_attr(attrs::LANG, "Eng");
        emitter.set_attr(attrs::MIME_TYPE, "audio/wav");
        let aggregator = AudioAggregator::new();
        aggregator.add(0, b"pcm-bytes".to_vec());

        f.finalizer.process_final(&emitter, &aggregator).await;

        assert_eq!(f.stt.calls.load(Ordering::SeqCst), 1);
        // Forward en->ko and back ko->en around generation.
        assert_eq!(f.trans.calls.load(Ordering::SeqCst), 2);
        let frames = text_frames(&mut rx);
        // Transcript echo precedes the generated answer.
        assert!(frames.iter().any(|j| j.contains("\"TRANS\"") && j.contains("hello")));
        assert!(frames.iter().any(|j| j.contains("original_text")));
        assert!(emitter.is_completed());
    }

    #[tokio::test]
    async fn test_transcode_failure_skips_the_chain() {
        let f = fixture(
            MockSttClient::transcribing("hello"),
            Arc::new(FailingTranscoder),
        );
        let (emitter, mut rx) = Emitter::new("s1");
        emitter.set_attr(attrs::LANG, "Kor");
        emitter.set_attr(attrs::MIME_TYPE, "audio/webm;codecs=opus");
        let aggregator = AudioAggregator::new();
        aggregator.add(0, b"container-bytes".to_vec());

        f.finalizer.process_final(&emitter, &aggregator).await;

        let frames = text_frames(&mut rx);
        assert!(frames.iter().any(|j| j.contains("audio transcoding failed")));
        assert_eq!(f.stt.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.llm.answer_calls.load(Ordering::SeqCst), 0);
        assert!(emitter.is_completed());
    }

    #[tokio::test]
    async fn test_recognition_failure_is_reported() {
        let f = fixture(MockSttClient::default(), Arc::new(PassthroughTranscoder));
        let (emitter, mut rx) = Emitter::new("s1");
        emitter.set_attr(attrs::LANG, "Kor");
        emitter.set_attr(attrs::MIME_TYPE, "audio/wav");
        let aggregator = AudioAggregator::new();
        aggregator.add(0, b"pcm-bytes".to_vec());

        f.finalizer.process_final(&emitter, &aggregator).await;

        let frames = text_frames(&mut rx);
        assert!(frames.iter().any(|j| j.contains("speech recognition failed")));
        assert_eq!(f.llm.answer_calls.load(Ordering::SeqCst), 0);
    }
}
