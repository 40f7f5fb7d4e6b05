#[cfg(not(any(all(target_os = "macos", target_arch = "aarch64"), target_os = "ios")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;

use dotenv::dotenv;
use histofuse::{ModelBundle, PredictionService, SyntheticAttention};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod routes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting histofuse local API");

    let config = config::Config::from_env()?;
    tracing::info!(
        "Loaded configuration: port={}, labels={}, head={}, backbone={}",
        config.port,
        config.artifacts.labels.display(),
        config.artifacts.head_weights.display(),
        config.artifacts.backbone.path.display()
    );

    // Refuse to serve without a model; there is no fallback prediction path
    let artifacts = config.artifacts.clone();
    let bundle = tokio::task::spawn_blocking(move || ModelBundle::load(&artifacts))
        .await?
        .inspect_err(|e| {
            let mut source = std::error::Error::source(e);
            while let Some(cause) = source {
                tracing::error!(cause = %cause, "Caused by");
                source = cause.source();
            }
        })?;

    let state = routes::AppState::new(
        PredictionService::new(Arc::new(bundle)),
        Arc::new(SyntheticAttention::default()),
    );
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
