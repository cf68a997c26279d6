use std::future::IntoFuture;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_admin::AdminState;
use api_consent::ConsentState;
use consent_core::{AppConfig, AppContext};

/// Main entry point for the consent service
///
/// Starts both HTTP servers concurrently and, in production, the backup and
/// session purge schedule:
/// - consent API on `CONSENT_ADDR` (default "0.0.0.0:3000")
/// - admin panel on `ADMIN_ADDR` (default "0.0.0.0:3001")
///
/// The consent API is public, optionally guarded by `SUBMIT_TOKEN`.
/// The admin panel requires a session from `/api/login`.
///
/// Ctrl-C stops both servers gracefully and aborts the scheduled jobs.
///
/// # Returns
/// * `Ok(())` - If servers start, run and shut down cleanly
/// * `Err(anyhow::Error)` - If startup or either server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("consent_run=info".parse()?)
                .add_directive("api_admin=info".parse()?)
                .add_directive("api_consent=info".parse()?)
                .add_directive("consent_core=info".parse()?)
                .add_directive("consent_cloud=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env()?;
    let production = cfg.environment.is_production();
    api_shared::expose_internal_details(!production);
    let ctx = AppContext::initialise(cfg)?;

    let consent_addr = ctx.config.consent_addr.clone();
    let admin_addr = ctx.config.admin_addr.clone();
    tracing::info!("++ Starting consent API on {}", consent_addr);
    tracing::info!("++ Starting admin panel on {}", admin_addr);

    let origins = &ctx.config.allowed_origins;
    let consent_app = api_consent::router(ConsentState::from_context(&ctx), origins, production);
    let admin_app = api_admin::router(AdminState::from_context(&ctx), origins, production);

    let jobs = ctx.start_scheduled_jobs();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("-- Shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    let consent_listener = tokio::net::TcpListener::bind(&consent_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;

    let consent_server = axum::serve(
        consent_listener,
        consent_app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_rx.clone()))
    .into_future();

    let admin_server = axum::serve(
        admin_listener,
        admin_app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_rx))
    .into_future();

    // Run both
    let result = tokio::try_join!(consent_server, admin_server);

    for job in jobs {
        job.abort();
    }
    result?;

    Ok(())
}

/// Resolves once the shutdown flag flips, or its sender is dropped.
async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
