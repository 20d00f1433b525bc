//! HTTP ingestion service and dashboard endpoints.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /data`, `POST /sensors` | append a JSON payload |
//! | `GET /data` | connectivity placeholder (or stored entries in `records` mode) |
//! | `GET /latest` | most recent stored payload |
//! | `GET /` | rendered dashboard of all sensor logs |
//! | `GET /dashboard` | static dashboard page |
//! | `GET /api/dashboard` | dashboard data as JSON |
//! | `GET /healthz` | liveness |

#![allow(missing_docs)]

pub mod envelope;
pub mod handlers;
pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::core::config::{Config, ListMode};
use crate::core::errors::{Result, ThError};
use crate::dashboard::DashboardAssembler;
use crate::dashboard::render::DashboardRenderer;
use crate::store::TelemetryStore;

pub use routes::build_router;

/// Shared, read-only request state. The store is the only mutable resource.
pub struct AppState {
    pub store: Arc<dyn TelemetryStore>,
    pub dashboard: DashboardAssembler,
    pub renderer: DashboardRenderer,
    pub list_mode: ListMode,
    pub static_page: Option<PathBuf>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn TelemetryStore>) -> Result<Self> {
        Ok(Self {
            store,
            dashboard: DashboardAssembler::from_config(config)?,
            renderer: DashboardRenderer::new()?,
            list_mode: config.server.list_mode,
            static_page: config.dashboard.static_page.clone(),
        })
    }
}

/// Bind `addr` and serve until SIGINT/SIGTERM.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|err| ThError::Runtime {
        details: format!("bind {addr}: {err}"),
    })?;
    let local = listener.local_addr().map_err(|err| ThError::Runtime {
        details: format!("local address: {err}"),
    })?;
    info!(
        backend = state.store.backend_name(),
        sensors = state.dashboard.sensors().len(),
        "listening on http://{local}"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ThError::Runtime {
            details: format!("server: {err}"),
        })?;

    info!("server shut down gracefully");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}
