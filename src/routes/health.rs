use axum::extract::State;
use axum::{http::StatusCode, response::Json};
use serde_json::json;

use crate::jobs;
use crate::state::AppState;

/// Liveness plus a cheap look at the job queue; a database outage degrades
/// the report instead of failing the probe.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let queue_depth = state
        .db()
        .ok()
        .and_then(|mut conn| jobs::queue_depth(&mut conn).ok());

    match queue_depth {
        Some(depth) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "queue_depth": depth })),
        ),
        None => (
            StatusCode::OK,
            Json(json!({ "status": "degraded", "queue_depth": null })),
        ),
    }
}
