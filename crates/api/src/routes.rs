use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use mediagen_dispatcher::GenerationPipeline;

use crate::handlers::{
    generations::{create_generation, generation_feed, generation_sitemap, get_generation, get_generation_by_slug},
    health::health_check,
    models::list_models,
    router::get_cooldowns,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GenerationPipeline>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 生成任务
        .route("/api/generate", post(create_generation))
        .route("/api/generations/feed", get(generation_feed))
        .route("/api/generations/sitemap", get(generation_sitemap))
        .route("/api/generations/slug/{slug}", get(get_generation_by_slug))
        .route("/api/generations/{id}", get(get_generation))
        // 模型目录与路由状态
        .route("/api/models", get(list_models))
        .route("/api/router/cooldowns", get(get_cooldowns))
        .with_state(state)
}
