//! 外部协作方抽象
//!
//! 积分账本、生成记录存储、模型目录和对象存储都在编排核心之外,
//! 这里只定义接口, 具体实现位于 infrastructure crate。

use async_trait::async_trait;
use mediagen_errors::GenerationResult;
use uuid::Uuid;

use crate::entities::{
    GenerationJob, JobOutcome, ModelConfig, ModelKind, NewGenerationJob, SitemapEntry,
};
use crate::value_objects::{Page, PageRequest};

/// 积分账本
///
/// `debit` 必须是原子的: 余额不足时返回 `InsufficientFunds` 且不扣减。
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn debit(&self, user_id: &str, amount: i64) -> GenerationResult<()>;
    /// 补偿性退款
    async fn credit(&self, user_id: &str, amount: i64) -> GenerationResult<()>;
    async fn balance(&self, user_id: &str) -> GenerationResult<Option<i64>>;
}

/// 生成记录存储
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &NewGenerationJob) -> GenerationResult<GenerationJob>;
    /// 仅当记录仍为 PENDING 时写入终态, 返回是否发生了写入
    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> GenerationResult<bool>;
    async fn get_by_id(&self, id: Uuid) -> GenerationResult<Option<GenerationJob>>;
    async fn get_by_slug(&self, slug: &str) -> GenerationResult<Option<GenerationJob>>;
    /// 已完成记录的公开列表, 按创建时间倒序
    async fn list_completed(&self, page: PageRequest) -> GenerationResult<Page<GenerationJob>>;
    async fn sitemap(&self, limit: i64) -> GenerationResult<Vec<SitemapEntry>>;
}

/// 模型目录 (只读, 仅返回启用的模型)
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn find_by_id(&self, id: &str) -> GenerationResult<Option<ModelConfig>>;
    async fn find_by_path(&self, api_path: &str) -> GenerationResult<Option<ModelConfig>>;
    async fn list_active(&self, kind: Option<ModelKind>) -> GenerationResult<Vec<ModelConfig>>;

    /// 先按目录 id 精确匹配, 再按后端路径回退
    async fn get_active_model(&self, key: &str) -> GenerationResult<Option<ModelConfig>> {
        if let Some(model) = self.find_by_id(key).await? {
            return Ok(Some(model));
        }
        self.find_by_path(key).await
    }
}

/// 持久化对象存储
///
/// 接受普通 URL 与 data URI。内部失败时返回原始 URL 而不是报错,
/// 生成结果不会因为转存失败而丢失。
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn persist(&self, source: &str, folder: &str) -> String;
}
