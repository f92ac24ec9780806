//! Binary entry point.
//!
//! Grounded on the teacher's `main.rs` (load config, init tracing, build
//! state, serve with graceful shutdown on Ctrl+C/SIGTERM).

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use shellwright_codegen::{CodeGeneratorFacade, TemplateGenerator};
use shellwright_config::{ChannelRegistry, PersonaRegistry, ProviderConfig, Settings};
use shellwright_exec::Scheduler;
use shellwright_llm::providers::{
    AnthropicCompatibleProvider, CustomHttpProvider, GeminiProvider, LlmProvider,
    OllamaProvider, OpenAiCompatibleProvider,
};
use shellwright_llm::{PromptAssembler, PromptParams, ProviderGateway};
use shellwright_memory::ConversationMemory;
use shellwright_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("SHELLWRIGHT_CONFIG").ok();
    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load configuration: {err}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting shellwright");

    let personas = PersonaRegistry::new();
    load_personas(&personas, &settings.paths.personas);

    let channels = ChannelRegistry::new();
    load_channels(&channels, &settings.paths.channels);

    let memory = ConversationMemory::new(
        settings.memory.max_conversations,
        settings.memory.max_messages_per_conversation,
    );

    let providers = build_providers(
        &settings.llm.ordered_providers,
        &settings.llm.providers,
        settings.llm.provider_max_timeout_ms,
        settings.llm.health_timeout_ms,
    );
    tracing::info!(count = providers.len(), "configured LLM providers");
    let gateway = Arc::new(ProviderGateway::new(providers, settings.llm.max_fallbacks));

    spawn_health_prober(gateway.clone(), settings.llm.health_interval_secs);

    let default_params = PromptParams {
        temperature: settings.llm.temperature,
        max_tokens: settings.llm.max_tokens,
        stop: None,
        timeout_ms: settings.llm.timeout_ms,
    };

    let codegen = CodeGeneratorFacade::new(
        PromptAssembler::new(default_params.clone()),
        TemplateGenerator::new(settings.llm.template_match_threshold),
    );

    let scheduler = Scheduler::new(
        settings.scheduler.max_concurrent,
        settings.scheduler.history_max,
        settings.scheduler.max_timeout_seconds,
        settings.scheduler.resource_sample_interval_ms,
        settings.scheduler.grace_period_ms,
        settings.scheduler.aging_threshold_seconds,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let state = AppState {
        settings: Arc::new(settings),
        personas: Arc::new(personas),
        channels: Arc::new(channels),
        memory: Arc::new(memory),
        gateway,
        codegen: Arc::new(codegen),
        prompt_assembler: Arc::new(PromptAssembler::new(default_params)),
        scheduler,
        started_at: Instant::now(),
    };

    let app = create_router(state);

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

fn load_personas(registry: &PersonaRegistry, dir: &str) {
    match registry.load_all(Path::new(dir)) {
        Ok(report) => {
            tracing::info!(loaded = report.loaded.len(), rejected = report.rejected.len(), dir, "loaded personas");
            for rejected in &report.rejected {
                tracing::warn!(path = %rejected.path, reason = %rejected.reason, "rejected persona");
            }
        }
        Err(err) => tracing::warn!(dir, error = %err, "no personas directory, using synthetic default"),
    }
}

fn load_channels(registry: &ChannelRegistry, dir: &str) {
    match registry.load_all(Path::new(dir)) {
        Ok(report) => {
            tracing::info!(loaded = report.loaded.len(), rejected = report.rejected.len(), dir, "loaded channels");
            for rejected in &report.rejected {
                tracing::warn!(path = %rejected.path, reason = %rejected.reason, "rejected channel");
            }
        }
        Err(err) => tracing::warn!(dir, error = %err, "no channels directory, using web default"),
    }
}

fn build_providers(
    order: &[String],
    configs: &[ProviderConfig],
    max_timeout_ms: u64,
    health_timeout_ms: u64,
) -> Vec<Arc<dyn LlmProvider>> {
    order
        .iter()
        .filter_map(|name| {
            let config = configs.iter().find(|c| &c.name == name)?;
            build_provider(config, max_timeout_ms, health_timeout_ms).or_else(|| {
                tracing::warn!(provider = %name, kind = %config.kind, "skipping provider: missing credentials or unknown kind");
                None
            })
        })
        .collect()
}

fn build_provider(config: &ProviderConfig, max_timeout_ms: u64, health_timeout_ms: u64) -> Option<Arc<dyn LlmProvider>> {
    let api_key = config
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok());

    let provider: Arc<dyn LlmProvider> = match config.kind.as_str() {
        "ollama" => Arc::new(OllamaProvider::new(
            &config.name,
            &config.base_url,
            &config.model,
            max_timeout_ms,
            health_timeout_ms,
        )),
        "openai" | "openai_compatible" => Arc::new(OpenAiCompatibleProvider::new(
            &config.name,
            &config.base_url,
            &config.model,
            api_key,
            max_timeout_ms,
            health_timeout_ms,
        )),
        "anthropic" | "anthropic_compatible" => Arc::new(AnthropicCompatibleProvider::new(
            &config.name,
            &config.base_url,
            &config.model,
            api_key?,
            max_timeout_ms,
            health_timeout_ms,
        )),
        "gemini" => Arc::new(GeminiProvider::new(
            &config.name,
            &config.base_url,
            &config.model,
            api_key?,
            max_timeout_ms,
            health_timeout_ms,
        )),
        "custom" => Arc::new(CustomHttpProvider::new(
            &config.name,
            &config.base_url,
            config.response_pointer.clone().unwrap_or_else(|| "/text".to_string()),
            Vec::new(),
            max_timeout_ms,
            health_timeout_ms,
        )),
        other => {
            tracing::warn!(kind = other, "unrecognized provider kind");
            return None;
        }
    };

    Some(provider)
}

fn spawn_health_prober(gateway: Arc<ProviderGateway>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            gateway.probe_all().await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("shellwright={},tower_http=info", settings.logging.level).into());

    let fmt_layer = if settings.logging.sink == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
