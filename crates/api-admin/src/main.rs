//! Standalone admin panel server binary.
//!
//! ## Purpose
//! Runs only the admin panel, without the public consent endpoint or the
//! scheduled backup jobs.
//!
//! ## Intended use
//! Development and debugging. Deployments use the workspace's `consent-run`
//! binary, which runs both services and the job schedule.

use api_admin::{router, AdminState};
use consent_core::{AppConfig, AppContext};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the admin panel server
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - configuration, the database or the CSV inputs cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_admin=info".parse()?)
                .add_directive("consent_core=info".parse()?)
                .add_directive("consent_cloud=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env()?;
    api_shared::expose_internal_details(!cfg.environment.is_production());
    let ctx = AppContext::initialise(cfg)?;

    let addr = ctx.config.admin_addr.clone();
    tracing::info!("-- Starting admin panel on {}", addr);

    let app = router(
        AdminState::from_context(&ctx),
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
