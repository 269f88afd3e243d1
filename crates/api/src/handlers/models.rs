use axum::{
    extract::{Query, State},
    Json,
};
use mediagen_domain::{ModelConfig, ModelKind};
use serde::Deserialize;

use crate::{error::ApiResult, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct ModelQueryParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// 启用的模型, 可按类型 (`IMAGE` / `VIDEO` / `CHAT`, 大小写不敏感) 过滤
pub async fn list_models(
    State(state): State<AppState>,
    Query(params): Query<ModelQueryParams>,
) -> ApiResult<Json<Vec<ModelConfig>>> {
    let kind = params
        .kind
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .map(str::parse::<ModelKind>)
        .transpose()?;
    Ok(Json(state.pipeline.list_models(kind).await?))
}
