//! Liveness and readiness probes.
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /health` | Aggregated status — 200 if UP, 503 if DOWN |
//! | `GET /health/live` | Liveness probe — always 200 |
//! | `GET /health/ready` | Readiness probe — 200 when the store answers |
//!
//! The bus is reported but does not gate readiness: a worker with a
//! stale-cache risk is still able to serve evaluations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Clone)]
pub struct HealthState {
    pub pool: PgPool,
    pub bus_connected: Arc<AtomicBool>,
    pub started_at: Instant,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "UPPERCASE")]
enum CheckStatus {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: CheckStatus,
    checks: Vec<Check>,
    uptime_seconds: u64,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .with_state(state)
}

async fn db_check(pool: &PgPool) -> Check {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => Check {
            name: "db",
            status: CheckStatus::Up,
            reason: None,
        },
        Err(err) => Check {
            name: "db",
            status: CheckStatus::Down,
            reason: Some(err.to_string()),
        },
    }
}

fn bus_check(state: &HealthState) -> Check {
    if state.bus_connected.load(Ordering::Relaxed) {
        Check {
            name: "bus",
            status: CheckStatus::Up,
            reason: None,
        }
    } else {
        Check {
            name: "bus",
            status: CheckStatus::Down,
            reason: Some("not subscribed".to_string()),
        }
    }
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let checks = vec![db_check(&state.pool).await, bus_check(&state)];
    let all_up = checks.iter().all(|c| c.status == CheckStatus::Up);
    let response = HealthResponse {
        status: if all_up {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        },
        checks,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };
    let code = if all_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

async fn live() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "UP" }))
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    let db = db_check(&state.pool).await;
    let code = if db.status == CheckStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(serde_json::json!({ "status": db.status })))
}
