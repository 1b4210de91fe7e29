//! Liveness and health.

use emporio_core::millis;
use emporio_middleware::{Response, ResponseExt};
use emporio_server::HandlerResult;
use http::StatusCode;
use serde::Serialize;

use super::AppState;

/// Database section of the health report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    /// Whether `SELECT 1` succeeded.
    pub is_connected: bool,
}

/// Health report.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// Always `healthy` when the process answers.
    pub status: &'static str,
    /// Database reachability.
    pub database: DatabaseHealth,
}

/// `GET /ping`.
pub async fn ping() -> HandlerResult<Response> {
    Ok(Response::text(StatusCode::OK, "pong"))
}

/// `GET /health`: pings the database outside any request transaction.
pub async fn health(state: &AppState) -> HandlerResult<HealthReport> {
    let is_connected = match state.session_manager().ping().await {
        Ok(latency) => {
            tracing::debug!(latency_ms = millis(latency), "database ping");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "database ping failed");
            false
        }
    };

    Ok(HealthReport {
        status: "healthy",
        database: DatabaseHealth { is_connected },
    })
}
