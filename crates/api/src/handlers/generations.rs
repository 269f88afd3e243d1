use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use mediagen_domain::{GenerationJob, GenerationRequest, JobCreated, Page, PageRequest, SitemapEntry};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SitemapQueryParams {
    pub limit: Option<i64>,
}

/// 创建生成任务
///
/// 请求体无法解析 (包括未知的 `type`) 按参数错误返回 400。
pub async fn create_generation(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> ApiResult<Json<JobCreated>> {
    let Json(request) = payload?;
    let created = state.pipeline.submit(request).await?;
    info!(generation_id = %created.generation_id, "已受理生成请求");
    Ok(Json(created))
}

pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GenerationJob>> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::bad_request(format!("无效的记录 id: {id}")))?;
    Ok(Json(state.pipeline.get_job(id).await?))
}

pub async fn get_generation_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<GenerationJob>> {
    Ok(Json(state.pipeline.get_job_by_slug(&slug).await?))
}

pub async fn generation_feed(
    State(state): State<AppState>,
    params: Result<Query<FeedQueryParams>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<Page<GenerationJob>>> {
    let Query(params) = params?;
    let page = PageRequest::new(params.page, params.page_size);
    Ok(Json(state.pipeline.public_feed(page).await?))
}

pub async fn generation_sitemap(
    State(state): State<AppState>,
    params: Result<Query<SitemapQueryParams>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<Vec<SitemapEntry>>> {
    let Query(params) = params?;
    Ok(Json(state.pipeline.sitemap(params.limit).await?))
}
