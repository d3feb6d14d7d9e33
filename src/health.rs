use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_secs(),
        "service": {
            "name": "chat-bridge-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": state.config.server.host,
            "port": state.config.server.port
        },
        "sessions": {
            "active": state.registry.active_count()
        },
        "pipeline": {
            "pivot_lang": state.config.pipeline.pivot_lang,
            "llm_model": state.config.collab.llm_model
        }
    }))
}
