//! Loopline identity federation service.
//!
//! Serves the SSO admin and login/callback routes over Axum, runs schema
//! migrations at startup and sweeps expired sessions and authorization
//! states in the background.

mod config;
mod logging;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::{routing::get, Router};
use config::Config;
use loopline_core::OrgId;
use loopline_db::{run_migrations, DbPool};
use loopline_sso::{admin_routes, federation_routes, SsoModuleConfig, SsoState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tracing::info;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_filter);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.base_url,
        "starting loopline server"
    );

    let pool = match DbPool::connect(&config.database_url).await {
        Ok(pool) => {
            info!("database connection established");
            pool
        }
        Err(e) => {
            eprintln!("failed to connect to database: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        eprintln!("FATAL: migrations failed: {e}");
        std::process::exit(1);
    }

    let sso_config = SsoModuleConfig {
        pool: pool.into_inner(),
        master_key: config.master_key,
        base_url: config.base_url.clone(),
    };
    let state = SsoState::new(&sso_config);

    // Periodic sweep: mark overdue sessions expired, purge stale
    // authorization states.
    {
        let auth_flow = state.auth_flow.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(MAINTENANCE_INTERVAL).await;
                if let Err(e) = auth_flow.run_maintenance().await {
                    tracing::warn!(error = %e, "maintenance sweep failed");
                }
            }
        });
    }

    // Admin routes require an organization scope. Deployments embedding this
    // service behind an authenticating gateway pass it as the X-Org-Id
    // header; federation routes are reached by the browser unauthenticated.
    let admin = admin_routes().layer(axum::middleware::from_fn(org_context));

    let app = Router::new()
        .route("/health", get(health))
        .nest("/admin/sso", admin)
        .nest("/sso", federation_routes())
        .with_state(state);

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("invalid bind address '{}': {e}", config.bind_addr());
            std::process::exit(1);
        }
    };

    info!(%addr, "server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("failed to bind to {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }

    info!("server shutdown complete");
}

async fn health() -> &'static str {
    "ok"
}

/// Extract the organization scope from the `X-Org-Id` header.
async fn org_context(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let org = req
        .headers()
        .get("x-org-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<uuid::Uuid>().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    req.extensions_mut().insert(OrgId::from_uuid(org));
    Ok(next.run(req).await)
}

/// Graceful shutdown on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}
