//! Standalone consent API server binary.
//!
//! ## Purpose
//! Runs only the public consent endpoint.
//!
//! ## Intended use
//! Useful for development or for deployments that host the admin panel
//! elsewhere. The workspace's main `consent-run` binary runs both services and
//! the scheduled jobs.

use api_consent::{router, ConsentState};
use consent_core::{AppConfig, AppContext};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the consent API server
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - configuration or the database cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_consent=info".parse()?)
                .add_directive("consent_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env()?;
    api_shared::expose_internal_details(!cfg.environment.is_production());
    let ctx = AppContext::initialise(cfg)?;

    let addr = ctx.config.consent_addr.clone();
    tracing::info!("-- Starting consent API on {}", addr);

    let app = router(
        ConsentState::from_context(&ctx),
        &ctx.config.allowed_origins,
        ctx.config.environment.is_production(),
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    Ok(())
}
