use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let runner = state.pipeline.runner();
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "mediagen",
        "version": env!("CARGO_PKG_VERSION"),
        "jobs_in_flight": runner.in_flight(),
        "max_concurrent_jobs": runner.max_concurrent(),
    }))
}
