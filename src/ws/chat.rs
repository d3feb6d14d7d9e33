//! # Chat WebSocket Handler
//!
//! Handles the text side of the session protocol at `/ws/chat`. Each
//! connection is an independent actor plus one detached worker task that
//! owns the session's inbound order: the worker pulls items from a FIFO
//! channel and awaits each message's full pipeline chain before pulling
//! the next one. Distinct sessions have distinct workers and run fully
//! concurrently.
//!
//! ## Message Flow:
//! 1. **Connection**: actor registers an emitter and spawns the worker
//! 2. **Inbound**: text frames parse into [`ChatInbound`] and are queued
//!    on the worker in arrival order; unparsable frames are dropped
//! 3. **Outbound**: the emitter's receiving half is attached to the actor
//!    as a stream, so pipeline output from any task reaches the socket
//! 4. **Teardown**: the registry cleans up (and completes) the emitter
//!    exactly once when the actor stops

use crate::lang::translation_code_or_pivot;
use crate::pipeline::model::PipelineMessage;
use crate::pipeline::orchestrator::Orchestrator;
use crate::state::AppState;
use crate::ws::emitter::{attrs, Emitter, OutboundFrame};
use crate::ws::protocol::{ChatInbound, ChatOutbound};
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

/// One unit queued on a session's worker. Every inbound type goes through
/// the same queue so replies keep arrival order with pipeline output.
pub enum WorkItem {
    Start,
    Ping,
    Chat(PipelineMessage),
}

/// Spawn the single-consumer worker that serializes one session's items.
///
/// The worker awaits each chain start-to-settle, which is what guarantees
/// that message N+1 begins no observable work before message N finished.
pub fn spawn_session_worker(
    orchestrator: Arc<Orchestrator>,
    emitter: Emitter,
) -> mpsc::UnboundedSender<WorkItem> {
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkItem>();
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                WorkItem::Start => {
                    emitter.emit(&ChatOutbound::system("session ready"));
                }
                WorkItem::Ping => {
                    emitter.emit(&ChatOutbound::pong(chrono::Utc::now().timestamp_millis()));
                }
                WorkItem::Chat(msg) => {
                    orchestrator.run(msg, &emitter).await;
                }
            }
        }
        debug!("[{}] session worker drained", emitter.session_id());
    });
    tx
}

/// WebSocket actor for one chat connection.
pub struct ChatWebSocket {
    session_id: String,
    state: AppState,
    emitter: Emitter,
    worker_tx: mpsc::UnboundedSender<WorkItem>,
    /// Receiving half of the emitter, attached as a stream in `started`.
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundFrame>>,
    last_heartbeat: Instant,
}

impl ChatWebSocket {
    fn new(
        session_id: String,
        state: AppState,
        emitter: Emitter,
        outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    ) -> Self {
        let worker_tx = spawn_session_worker(Arc::clone(&state.orchestrator), emitter.clone());
        Self {
            session_id,
            state,
            emitter,
            worker_tx,
            outbound_rx: Some(outbound_rx),
            last_heartbeat: Instant::now(),
        }
    }

    /// Queue one parsed inbound frame on the session worker.
    fn route(&mut self, inbound: ChatInbound) {
        let item = match inbound {
            ChatInbound::Start => WorkItem::Start,
            ChatInbound::Ping => WorkItem::Ping,
            ChatInbound::Chat {
                text,
                lang,
                room_id,
            } => {
                // Frame-level metadata sticks to the session for later
                // messages that omit it.
                if let Some(lang) = &lang {
                    self.emitter.set_attr(attrs::LANG, lang.clone());
                }
                if let Some(room) = &room_id {
                    self.emitter.set_attr(attrs::ROOM_ID, room.clone());
                }
                let lang = lang.or_else(|| self.emitter.attr(attrs::LANG));
                let room_id = room_id
                    .or_else(|| self.emitter.attr(attrs::ROOM_ID))
                    .unwrap_or_else(|| "default".to_string());
                WorkItem::Chat(PipelineMessage {
                    text,
                    source_lang: translation_code_or_pivot(
                        lang.as_deref(),
                        &self.state.config.pipeline.pivot_lang,
                    ),
                    trace_id: self.session_id.clone(),
                    room_id,
                })
            }
            ChatInbound::Finish | ChatInbound::Unknown => {
                // FINISH belongs to the audio protocol; on the chat socket
                // it must never cut off answers still queued on the worker.
                debug!("[{}] ignoring control frame on chat socket", self.session_id);
                return;
            }
        };
        // Worker loss means the session is already tearing down.
        let _ = self.worker_tx.send(item);
    }
}

impl Actor for ChatWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("[{}] chat connection started", self.session_id);

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
        info!("[{}] chat connection stopped", self.session_id);
        self.state.registry.cleanup(&self.session_id);
    }
}

/// Drain the emitter queue onto the socket.
impl StreamHandler<OutboundFrame> for ChatWebSocket {
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
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ChatInbound>(&text) {
                Ok(inbound) => self.route(inbound),
                Err(err) => {
                    // Unparsable frames are dropped, never fatal.
                    warn!("[{}] dropping unparsable frame: {}", self.session_id, err);
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!(
                    "[{}] binary frame on the chat socket, ignoring",
                    self.session_id
                );
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("[{}] chat socket closed: {:?}", self.session_id, reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!("[{}] chat protocol error: {}", self.session_id, err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a [`ChatWebSocket`] actor.
pub async fn chat_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let session_id = Uuid::new_v4().to_string();
    info!(
        "[{}] new chat connection from {:?}",
        session_id,
        req.connection_info().peer_addr()
    );

    let (emitter, rx) = state.registry.create_emitter(&session_id);
    let actor = ChatWebSocket::new(session_id, state.get_ref().clone(), emitter, rx);
    ws::start(actor, &req, stream)
}
