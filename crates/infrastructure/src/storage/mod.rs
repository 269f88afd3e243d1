//! 生成结果转存
//!
//! 后端返回的临时 URL 会过期, 完成的任务需要把结果转存到自己的对象存储。
//! 转存失败不影响任务结果: 记录 `StorageDegraded` 告警后原样返回源 URL。

pub mod http_storage;
pub mod passthrough;

use std::sync::Arc;

use mediagen_config::StorageConfig;
use mediagen_domain::MediaStorage;
use mediagen_errors::GenerationResult;
use tracing::info;

pub use http_storage::HttpObjectStorage;
pub use passthrough::PassthroughStorage;

pub const STORAGE_FALLBACK_TOTAL: &str = "mediagen_storage_fallback_total";

pub fn describe_storage_metrics() {
    metrics::describe_counter!(STORAGE_FALLBACK_TOTAL, "转存失败后回退为原始 URL 的次数");
}

/// 按配置选择存储实现; 未配置 endpoint 时结果 URL 原样保存
pub fn build_storage(config: &StorageConfig) -> GenerationResult<Arc<dyn MediaStorage>> {
    if config.is_configured() {
        info!(bucket = %config.bucket, "使用对象存储转存生成结果");
        Ok(Arc::new(HttpObjectStorage::new(config.clone())?))
    } else {
        info!("未配置对象存储, 生成结果保留原始 URL");
        Ok(Arc::new(PassthroughStorage))
    }
}
