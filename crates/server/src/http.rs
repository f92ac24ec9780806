//! Router assembly, spec.md §6 "HTTP/JSON API".
//!
//! Grounded on the teacher's `create_router` (`crates/server/src/http.rs`):
//! one `Router::new()` chain of routes plus trace/compression/CORS layers,
//! handed the shared state via `.with_state`.

use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{channels, chat, execute, personas, scripts, system};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_origins, state.settings.server.cors_enabled);

    Router::new()
        .route("/health", get(system::health))
        .route("/ready", get(system::ready))
        .route("/api/system/status", get(system::system_status))
        .route("/api/personas", get(personas::list))
        .route("/api/personas/current", get(personas::current))
        .route("/api/personas/:id", get(personas::get))
        .route("/api/personas/:id/switch", post(personas::switch))
        .route("/api/personas/create", post(personas::create))
        .route("/api/channels", get(channels::list))
        .route("/api/channels/current", get(channels::current))
        .route("/api/channels/:id", get(channels::get))
        .route("/api/channels/:id/switch", post(channels::switch))
        .route("/api/channels/create", post(channels::create))
        .route("/api/chat", post(chat::chat))
        .route("/api/generate/script", post(scripts::generate))
        .route("/api/scripts/improve", post(scripts::improve))
        .route("/api/scripts/validate", post(scripts::validate))
        .route("/api/execute/script", post(execute::submit))
        .route("/api/execute/task/:id", get(execute::get_task))
        .route("/api/execute/task/:id", delete(execute::cancel_task))
        .route("/api/execute/history", get(execute::history))
        .route("/api/execute/statistics", get(execute::statistics))
        .route("/api/execute/running", get(execute::running))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to permissive");
        return CorsLayer::new().allow_origin(Any).allow_methods([Method::GET, Method::POST, Method::DELETE]);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellwright_codegen::{CodeGeneratorFacade, TemplateGenerator};
    use shellwright_config::{ChannelRegistry, PersonaRegistry, Settings};
    use shellwright_exec::Scheduler;
    use shellwright_llm::{PromptAssembler, PromptParams, ProviderGateway};
    use shellwright_memory::ConversationMemory;
    use std::sync::Arc;
    use std::time::Instant;

    fn test_state() -> AppState {
        let settings = Settings::default();
        let default_params = PromptParams {
            temperature: settings.llm.temperature,
            max_tokens: settings.llm.max_tokens,
            stop: None,
            timeout_ms: settings.llm.timeout_ms,
        };

        AppState {
            settings: Arc::new(settings.clone()),
            personas: Arc::new(PersonaRegistry::new()),
            channels: Arc::new(ChannelRegistry::new()),
            memory: Arc::new(ConversationMemory::new(
                settings.memory.max_conversations,
                settings.memory.max_messages_per_conversation,
            )),
            gateway: Arc::new(ProviderGateway::new(Vec::new(), settings.llm.max_fallbacks)),
            codegen: Arc::new(CodeGeneratorFacade::new(
                PromptAssembler::new(default_params.clone()),
                TemplateGenerator::new(settings.llm.template_match_threshold),
            )),
            prompt_assembler: Arc::new(PromptAssembler::new(default_params)),
            scheduler: Scheduler::new(
                settings.scheduler.max_concurrent,
                settings.scheduler.history_max,
                settings.scheduler.max_timeout_seconds,
                settings.scheduler.resource_sample_interval_ms,
                settings.scheduler.grace_period_ms,
                settings.scheduler.aging_threshold_seconds,
            ),
            started_at: Instant::now(),
        }
    }

    #[test]
    fn router_builds_with_default_state() {
        let _ = create_router(test_state());
    }
}
