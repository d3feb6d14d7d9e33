//! # Audio WebSocket Handler
//!
//! Handles the recording side of the session protocol at `/ws/audio`.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: actor registers an emitter and a fresh aggregator
//! 2. **Metadata**: a JSON frame declares MIME type, language and room;
//!    values land in the emitter's attribute bag
//! 3. **Fragments**: binary frames `[u32 BE seq][payload]` are decoded
//!    and inserted into the aggregator in any arrival order
//! 4. **FINISH**: starts the debounce window; fragments still arriving
//!    inside the window are admitted and restart it; when it fires, the
//!    recording is merged, transcribed and run through the chain
//! 5. **Disconnect**: an abnormal close with unmerged fragments triggers
//!    the same finalization as an explicit FINISH

use crate::audio::aggregator::{decode_frame, AudioAggregator};
use crate::state::AppState;
use crate::ws::emitter::{attrs, Emitter, OutboundFrame};
use crate::ws::protocol::{AudioMeta, ChatInbound};
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// What the debounce state machine wants done with the quiet-window
/// timer after an inbound event.
#[derive(Debug, PartialEq, Eq)]
enum TimerCommand {
    /// Schedule the window, cancelling any previous one.
    Schedule,
    None,
}

/// Transition logic for the FINISH quiet window, kept apart from the
/// actor context so it can be driven directly.
///
/// Lifecycle: idle -> pending (FINISH) -> finalized (timer fired). Late
/// fragments while pending restart the window; everything after
/// finalization is a no-op.
#[derive(Debug, Default)]
struct FinishState {
    pending: bool,
    finalized: bool,
}

impl FinishState {
    fn on_finish(&mut self) -> TimerCommand {
        if self.finalized {
            return TimerCommand::None;
        }
        self.pending = true;
        TimerCommand::Schedule
    }

    fn on_fragment(&mut self) -> TimerCommand {
        if self.pending && !self.finalized {
            TimerCommand::Schedule
        } else {
            TimerCommand::None
        }
    }

    /// True exactly once: the first window that runs out wins.
    fn on_timer_fired(&mut self) -> bool {
        self.pending = false;
        if self.finalized {
            return false;
        }
        self.finalized = true;
        true
    }

    /// An abnormal disconnect with buffered, unmerged fragments counts
    /// as a finish.
    fn on_disconnect(&mut self, aggregator: &AudioAggregator) -> bool {
        if self.finalized || aggregator.is_closed() || aggregator.fragment_count() == 0 {
            return false;
        }
        self.finalized = true;
        true
    }
}

/// WebSocket actor for one audio upload connection.
pub struct AudioWebSocket {
    session_id: String,
    state: AppState,
    emitter: Emitter,
    aggregator: Arc<AudioAggregator>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundFrame>>,
    last_heartbeat: Instant,
    /// Pending debounce timer; re-armed by late fragments.
    finish_timer: Option<SpawnHandle>,
    finish: FinishState,
}

impl AudioWebSocket {
    fn new(
        session_id: String,
        state: AppState,
        emitter: Emitter,
        outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    ) -> Self {
        Self {
            session_id,
            state,
            emitter,
            aggregator: Arc::new(AudioAggregator::new()),
            outbound_rx: Some(outbound_rx),
            last_heartbeat: Instant::now(),
            finish_timer: None,
            finish: FinishState::default(),
        }
    }

    fn handle_text_frame(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        if let Ok(inbound) = serde_json::from_str::<ChatInbound>(text) {
            match inbound {
                ChatInbound::Finish => {
                    info!(
                        "[{}] FINISH received, {} fragments / {} bytes so far",
                        self.session_id,
                        self.aggregator.fragment_count(),
                        self.aggregator.total_bytes()
                    );
                    if self.finish.on_finish() == TimerCommand::Schedule {
                        self.arm_finish_timer(ctx);
                    }
                }
                ChatInbound::Start | ChatInbound::Ping => {
                    debug!("[{}] control frame on audio socket ignored", self.session_id);
                }
                _ => {}
            }
            return;
        }

        // Not a typed control frame; try the metadata shape.
        match serde_json::from_str::<AudioMeta>(text) {
            Ok(meta) if meta.has_any() => self.apply_meta(meta),
            _ => {
                warn!("[{}] dropping unparsable frame", self.session_id);
            }
        }
    }

    fn apply_meta(&self, meta: AudioMeta) {
        debug!("[{}] audio meta: {:?}", self.session_id, meta);
        if let Some(mime) = meta.mime_type {
            self.emitter.set_attr(attrs::MIME_TYPE, mime);
        }
        if let Some(lang) = meta.lang {
            self.emitter.set_attr(attrs::LANG, lang);
        }
        if let Some(room) = meta.room_id {
            self.emitter.set_attr(attrs::ROOM_ID, room);
        }
    }

    fn handle_fragment(&mut self, frame: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        match decode_frame(frame) {
            Some((seq, payload)) => {
                self.aggregator.add(seq, payload.to_vec());
                // A fragment inside the debounce window restarts it.
                if self.finish.on_fragment() == TimerCommand::Schedule {
                    self.arm_finish_timer(ctx);
                }
            }
            None => {
                warn!(
                    "[{}] dropping short binary frame ({} bytes)",
                    self.session_id,
                    frame.len()
                );
            }
        }
    }

    /// Start (or restart) the quiet window between FINISH and the merge.
    fn arm_finish_timer(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(handle) = self.finish_timer.take() {
            ctx.cancel_future(handle);
        }
        let debounce = Duration::from_millis(self.state.config.audio.finalize_debounce_ms);
        let handle = ctx.run_later(debounce, |act, _ctx| {
            act.finish_timer = None;
            if act.finish.on_timer_fired() {
                act.spawn_finalize();
            }
        });
        self.finish_timer = Some(handle);
    }

    /// Kick off merge + transcription + pipeline on a detached task. The
    /// emitter stream delivers the output and the terminal close.
    fn spawn_finalize(&self) {
        let finalizer = Arc::clone(&self.state.finalizer);
        let emitter = self.emitter.clone();
        let aggregator = Arc::clone(&self.aggregator);
        tokio::spawn(async move {
            finalizer.process_final(&emitter, &aggregator).await;
        });
    }
}

impl Actor for AudioWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("[{}] audio connection started", self.session_id);

        if let Some(rx) = self.outbound_rx.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("[{}] heartbeat timeout, closing connection", act.session_id);
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("[{}] audio connection stopped", self.session_id);

        // Abnormal disconnect with unmerged fragments counts as a finish.
        if self.finish.on_disconnect(&self.aggregator) {
            warn!(
                "[{}] disconnect with {} buffered fragments, finalizing",
                self.session_id,
                self.aggregator.fragment_count()
            );
            let finalizer = Arc::clone(&self.state.finalizer);
            let emitter = self.emitter.clone();
            let aggregator = Arc::clone(&self.aggregator);
            let registry = Arc::clone(&self.state.registry);
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                finalizer.process_final(&emitter, &aggregator).await;
                registry.cleanup(&session_id);
            });
        } else {
            self.state.registry.cleanup(&self.session_id);
        }
    }
}

/// Drain the emitter queue onto the socket.
impl StreamHandler<OutboundFrame> for AudioWebSocket {
    fn handle(&mut self, frame: OutboundFrame, ctx: &mut Self::Context) {
        match frame {
            OutboundFrame::Text(json) => ctx.text(json),
            OutboundFrame::Binary(bytes) => ctx.binary(bytes),
            OutboundFrame::Complete => {
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
            }
        }
    }
}

/// Handle incoming WebSocket frames.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text_frame(&text, ctx),
            Ok(ws::Message::Binary(data)) => self.handle_fragment(&data, ctx),
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("[{}] audio socket closed: {:?}", self.session_id, reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!("[{}] audio protocol error: {}", self.session_id, err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler for audio uploads.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let session_id = Uuid::new_v4().to_string();
    info!(
        "[{}] new audio connection from {:?}",
        session_id,
        req.connection_info().peer_addr()
    );

    let (emitter, rx) = state.registry.create_emitter(&session_id);
    let actor = AudioWebSocket::new(session_id, state.get_ref().clone(), emitter, rx);
    ws::start(actor, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_arms_the_window_and_fires_once() {
        let mut finish = FinishState::default();
        assert_eq!(finish.on_finish(), TimerCommand::Schedule);
        assert!(finish.on_timer_fired());

        // A second FINISH after finalization neither re-arms nor re-fires.
        assert_eq!(finish.on_finish(), TimerCommand::None);
        assert!(!finish.on_timer_fired());
    }

    #[test]
    fn test_late_fragment_restarts_the_pending_window() {
        let mut finish = FinishState::default();

        // Before FINISH, fragments do not touch the timer.
        assert_eq!(finish.on_fragment(), TimerCommand::None);

        assert_eq!(finish.on_finish(), TimerCommand::Schedule);
        // Inside the quiet window every fragment restarts it.
        assert_eq!(finish.on_fragment(), TimerCommand::Schedule);
        assert_eq!(finish.on_fragment(), TimerCommand::Schedule);

        assert!(finish.on_timer_fired());
        // After the merge started, straggling fragments are ignored.
        assert_eq!(finish.on_fragment(), TimerCommand::None);
    }

    #[test]
    fn test_fragments_admitted_during_the_window_reach_the_merge() {
        let mut finish = FinishState::default();
        let aggregator = AudioAggregator::new();
        aggregator.add(0, vec![1, 2]);

        assert_eq!(finish.on_finish(), TimerCommand::Schedule);
        // Late fragment inside the window: admitted and re-armed.
        aggregator.add(1, vec![3, 4]);
        assert_eq!(finish.on_fragment(), TimerCommand::Schedule);

        assert!(finish.on_timer_fired());
        assert_eq!(aggregator.merge(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_disconnect_with_buffered_fragments_finalizes() {
        let mut finish = FinishState::default();
        let aggregator = AudioAggregator::new();
        aggregator.add(0, vec![1]);

        assert!(finish.on_disconnect(&aggregator));
        // The decision is one-shot.
        assert!(!finish.on_disconnect(&aggregator));
    }

    #[test]
    fn test_disconnect_without_work_only_cleans_up() {
        // Nothing was ever recorded.
        let mut finish = FinishState::default();
        assert!(!finish.on_disconnect(&AudioAggregator::new()));

        // The recording already went through the timer path.
        let mut finish = FinishState::default();
        let aggregator = AudioAggregator::new();
        aggregator.add(0, vec![1]);
        finish.on_finish();
        assert!(finish.on_timer_fired());
        assert!(!finish.on_disconnect(&aggregator));

        // The recording was already merged.
        let mut finish = FinishState::default();
        let aggregator = AudioAggregator::new();
        aggregator.add(0, vec![1]);
        let _ = aggregator.merge();
        assert!(!finish.on_disconnect(&aggregator));
    }
}
