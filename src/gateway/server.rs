//! Server bootstrap and lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::{Error, Result};

/// The gateway server
pub struct Gateway {
    config: Arc<Config>,
    state: Arc<AppState>,
}

impl Gateway {
    /// Build the gateway from validated configuration
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let state = Arc::new(AppState::new(Arc::clone(&config))?);
        Ok(Self { config, state })
    }

    /// Bind the listener and serve until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.config.server.host, self.config.server.port
        );

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!("============================================================");
        info!("TELEMATICS AUTH GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %local_addr.port(), "Listening");
        info!(environment = %self.config.server.environment, "Mode");
        info!(token_url = %self.config.upstream.token_url, "Upstream token endpoint");
        info!(
            allowed_origins = ?self.config.cors.allowed_origins,
            "Origin allow-list"
        );

        if self.config.rate_limit.enabled {
            info!(
                max_requests = self.config.rate_limit.max_requests,
                window_ms = self.config.rate_limit.window_ms,
                "RATE LIMITING enabled"
            );
        } else {
            warn!("RATE LIMITING disabled - gateway accepts unbounded request rates");
        }

        if self.config.auth.active_api_key().is_some() {
            info!("API KEY required on non-public paths (x-api-key header)");
        }

        info!("Routes:");
        info!("  GET  /                   (banner)");
        info!("  GET  /api/auth/health    (health)");
        info!("  POST /api/auth/exchange  (code -> tokens)");
        info!("  POST /api/auth/refresh   (refresh -> tokens)");
        info!("============================================================");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
