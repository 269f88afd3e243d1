use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

/// 冷却中的模型及剩余秒数
pub async fn get_cooldowns(State(state): State<AppState>) -> Json<Value> {
    let router = state.pipeline.router();
    Json(json!({
        "cooldown_seconds": router.cooldown().as_secs(),
        "models": state.pipeline.cooldowns(),
    }))
}
