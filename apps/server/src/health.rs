//! HTTP health probe.
//!
//! Reports 200 while the scheduler is making progress and 503 after too many
//! consecutive tick failures, so an external supervisor can restart the
//! process.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

/// Consecutive tick failures before the probe reports unhealthy.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Default)]
pub struct HealthState {
    consecutive_failures: AtomicU32,
}

impl HealthState {
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the new consecutive failure count.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < MAX_CONSECUTIVE_FAILURES
    }
}

async fn health_handler(State(health): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    if health.is_healthy() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

/// Serve the health endpoint until the process exits.
pub async fn serve(health: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .with_state(health);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Health endpoint listening");
    axum::serve(listener, app).await
}
