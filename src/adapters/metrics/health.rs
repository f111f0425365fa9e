//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7. Readiness requires the
//! reference data to be loaded and at least one feed to be consuming.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::adapters::feeds::FeedSupervisor;
use crate::domain::market::DataReadyFlag;

/// Shared health state polled by readiness probes.
#[derive(Clone)]
pub struct HealthState {
    /// Set once the data-load job completes.
    pub data_ready: Arc<DataReadyFlag>,
    /// Feed pipelines.
    pub feeds: Arc<FeedSupervisor>,
}

impl HealthState {
    pub fn new(data_ready: Arc<DataReadyFlag>, feeds: Arc<FeedSupervisor>) -> Self {
        Self { data_ready, feeds }
    }

    /// Check if the service is ready to serve subscribers.
    pub fn is_ready(&self) -> bool {
        self.data_ready.is_ready() && self.feeds.is_healthy()
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with all components.
    state: HealthState,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    pub fn new(state: HealthState, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until the shutdown signal.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(self.state.clone());

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 once data is loaded and a feed is consuming.
    async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_without_consuming_feeds() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = HealthState::new(
            Arc::new(DataReadyFlag::new(true)),
            Arc::new(FeedSupervisor::new(shutdown_tx)),
        );
        assert!(!state.is_ready());
    }
}
