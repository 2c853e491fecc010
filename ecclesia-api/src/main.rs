//! # Ecclesia API Server
//!
//! HTTP API for the church membership platform: registration and login,
//! member profiles, the administrative hierarchy, events with RSVPs and
//! email campaigns.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ecclesia-api
//! ```
//!
//! Configuration comes from the environment (and `.env`); see `config.rs`.

use anyhow::Context;
use ecclesia_api::{
    app::{build_router, AppState},
    config::Config,
    error::expose_internal_errors,
};
use ecclesia_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool_with_fallback},
    },
    mail::mailer_from_config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(
        "Ecclesia API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env().context("Invalid configuration")?;
    expose_internal_errors(config.is_development());

    let pool = create_pool_with_fallback(
        config.database.pool_config(),
        config.database.pooler_url.as_deref(),
    )
    .await
    .context("Failed to connect to the database")?;

    run_migrations(&pool)
        .await
        .context("Failed to apply database migrations")?;

    let mailer = mailer_from_config(&config.mail).context("Invalid mail configuration")?;

    let address = config.bind_address();
    let state = AppState::new(pool.clone(), config, mailer);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, closing database pool");
    close_pool(pool).await;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ecclesia_api=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
