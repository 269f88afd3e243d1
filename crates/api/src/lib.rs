//! # Mediagen API
//!
//! 生成服务的 REST 接口, 基于 Axum。只做参数解析与错误映射,
//! 业务全部委托给 [`GenerationPipeline`]。
//!
//! ## API 端点
//!
//! - `POST /api/generate` - 创建生成任务, 立即返回 `{status, generation_id, slug}`
//! - `GET /api/generations/{id}` - 按 id 查询生成记录
//! - `GET /api/generations/slug/{slug}` - 按 slug 查询生成记录
//! - `GET /api/generations/feed?page&page_size` - 已完成记录的公开列表
//! - `GET /api/generations/sitemap?limit` - 站点地图
//! - `GET /api/models?type=` - 启用的模型
//! - `GET /api/router/cooldowns` - 冷却中的模型
//! - `GET /health` - 健康检查
//!
//! ## 错误响应
//!
//! ```json
//! {
//!   "error": {
//!     "message": "积分不足或扣费失败",
//!     "type": "INSUFFICIENT_FUNDS",
//!     "code": 402,
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use mediagen_config::ApiConfig;
use mediagen_dispatcher::GenerationPipeline;
use tower::ServiceBuilder;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(pipeline: Arc<GenerationPipeline>, api_config: &ApiConfig) -> Router {
    let state = AppState { pipeline };
    let body_limit = api_config.max_request_size_mb * 1024 * 1024;

    let app = create_routes(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(trace_layer())
                .layer(axum::middleware::from_fn(request_logging)),
        );

    if api_config.cors_enabled {
        app.layer(cors_layer())
    } else {
        app
    }
}

/// 使用默认接口配置创建应用
pub fn create_simple_app(pipeline: Arc<GenerationPipeline>) -> Router {
    create_app(pipeline, &ApiConfig::default())
}
