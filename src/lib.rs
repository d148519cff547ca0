pub mod agent;
pub mod documents;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod settings;

use std::sync::{Arc, Once};

use agent::builtin;
use agent::tools::ToolRegistry;
use documents::DocumentStore;
use model::ollama::OllamaClient;
use model::ModelClient;
use pipeline::ResponsePipeline;
use server::AppState;
use settings::Settings;

/// Install ring as the process-wide rustls provider (reqwest is built with
/// `rustls-no-provider`). Safe to call any number of times.
pub fn ensure_tls_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("A rustls crypto provider was already installed");
        }
    });
}

/// Build a pipeline with the built-in tools for the given settings.
pub fn build_pipeline(model: Arc<dyn ModelClient>, settings: &Settings) -> ResponsePipeline {
    let mut tools = ToolRegistry::new();
    for tool in builtin::builtin_tools(&settings.agent) {
        tools.register(tool);
    }
    ResponsePipeline::new(model, tools, &settings.agent, settings.router.clone())
}

/// Shared server state: pipeline, empty document store and model client.
pub fn build_state(model: Arc<dyn ModelClient>, settings: &Settings) -> Arc<AppState> {
    Arc::new(AppState {
        pipeline: tokio::sync::Mutex::new(build_pipeline(model.clone(), settings)),
        documents: Arc::new(DocumentStore::new()),
        model,
        document_budget: settings.agent.document_budget,
    })
}

/// Load settings, connect to the model service and serve HTTP.
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lantern=info")),
        )
        .init();

    tracing::info!("Starting Lantern v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = settings::settings_path();
    let settings = Settings::load(&settings_path);
    tracing::info!(
        "Settings loaded: model={} at {}, shell tool {}",
        settings.model.model,
        settings.model.base_url,
        if settings.agent.shell_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let model: Arc<dyn ModelClient> = Arc::new(OllamaClient::new(&settings.model));
    match model.ping().await {
        Ok(()) => tracing::info!("Model service reachable"),
        Err(e) => tracing::warn!("Model service not reachable yet: {}", e),
    }

    let state = build_state(model, &settings);
    server::serve(state, &settings.server.bind_addr).await?;
    Ok(())
}
