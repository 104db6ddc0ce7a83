use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use profile_recommender::api::{create_router, AppState};
use profile_recommender::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        model_path = %config.model_path,
        corpus_path = %config.corpus_path,
        corpus_size = config.corpus_size,
        "Starting profile recommender"
    );

    let state = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || AppState::load(&config))
            .await
            .context("startup task panicked")?
            .context("failed to initialize recommendation service")?
    };

    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
