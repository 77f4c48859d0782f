use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mockprep::config::Config;
use mockprep::llm_client::LlmClient;
use mockprep::routes::build_router;
use mockprep::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (invalid values abort startup)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MockPrep API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the AI client: provider, shared rate limiter, model cascade
    let llm = LlmClient::from_config(&config)?;
    if !llm.check_availability().await {
        // Interview routes still answer with fallback content
        tracing::warn!(
            "AI provider '{}' is not reachable at startup",
            llm.provider_kind()
        );
    }

    let state = AppState {
        llm,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
