use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slack_relay::clock::SystemClock;
use slack_relay::config::Config;
use slack_relay::server::{AppState, build_router};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slack_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "loaded configuration");

    if config.skip_signature_verification {
        tracing::warn!(
            "SKIP_SIGNATURE_VERIFICATION is enabled; all requests will be accepted unverified"
        );
    }
    if config.dify_api_key.is_none() {
        tracing::error!("DIFY_API_KEY is not set; events will be accepted but never forwarded");
    }

    let state =
        AppState::from_config(&config, Arc::new(SystemClock)).expect("failed to build HTTP client");
    let app = build_router(state);

    tracing::info!("listening on {}", config.listen_addr);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
