//! # DawaPOS API
//!
//! HTTP server for the pharmacy counter.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          DawaPOS API Server                             │
//! │                                                                         │
//! │  Counter UI ───► HTTP (8000) ───► Routes ───► SQLite                   │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                                   Daraja                                │
//! │                              (STK push + callback)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dawa_db::{Database, DbConfig};
use dawa_mpesa::{DarajaClient, DisabledGateway, MpesaConfig, PaymentGateway, ReconciliationEngine};

use crate::config::ApiConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting DawaPOS API server...");

    let config = ApiConfig::load();
    info!(
        bind = %config.bind_addr,
        db = %config.database_path,
        "Configuration loaded"
    );

    // Connect + migrate
    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Database ready");

    // The API runs without Daraja credentials; only M-Pesa payments are
    // unavailable then
    let gateway: Arc<dyn PaymentGateway> = match MpesaConfig::from_env() {
        Ok(mpesa_config) => Arc::new(DarajaClient::new(mpesa_config)),
        Err(e) => {
            warn!(error = %e, "M-Pesa gateway disabled");
            Arc::new(DisabledGateway)
        }
    };

    let state = AppState {
        db: db.clone(),
        payments: ReconciliationEngine::new(db, gateway),
    };

    let cors = match &config.cors_origin {
        Some(origin) => {
            let origin: HeaderValue = origin.parse()?;
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM so in-flight requests can drain.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
