//! 生成任务流水线
//!
//! 请求路径上同步完成: 校验 -> 计费与后端选择 -> 扣费 -> 创建 PENDING 记录。
//! 之后的生成、转存与写入终态交给 [`JobRunner`] 在后台完成。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use mediagen_config::AppConfig;
use mediagen_domain::{
    generate_slug, CreditLedger, GenerationJob, GenerationRequest, JobCreated, JobRepository,
    MediaStorage, ModelCatalog, ModelConfig, ModelKind, NewGenerationJob, Page, PageRequest,
    SitemapEntry,
};
use mediagen_errors::{GenerationError, GenerationResult};
use mediagen_providers::ProviderFactory;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::executor::GenerationExecutor;
use crate::pricing::{CostResolver, ResolvedModel};
use crate::router::ModelRouter;
use crate::runner::JobRunner;
use crate::telemetry::JOBS_CREATED_TOTAL;

pub const DEFAULT_SITEMAP_LIMIT: i64 = 5000;
pub const MAX_SITEMAP_LIMIT: i64 = 50_000;

/// 编排核心之外的协作方
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn CreditLedger>,
    pub jobs: Arc<dyn JobRepository>,
    pub catalog: Arc<dyn ModelCatalog>,
    pub storage: Arc<dyn MediaStorage>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub pricing: mediagen_config::PricingConfig,
    pub fallback_enabled: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            pricing: mediagen_config::PricingConfig::default(),
            fallback_enabled: true,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pricing: config.pricing.clone(),
            fallback_enabled: config.router.fallback_enabled,
        }
    }
}

pub struct GenerationPipeline {
    ledger: Arc<dyn CreditLedger>,
    jobs: Arc<dyn JobRepository>,
    catalog: Arc<dyn ModelCatalog>,
    costs: CostResolver,
    executor: GenerationExecutor,
    router: Arc<ModelRouter>,
    runner: JobRunner,
    refund_on_record_failure: bool,
}

impl GenerationPipeline {
    pub fn new(
        collaborators: Collaborators,
        providers: Arc<ProviderFactory>,
        router: Arc<ModelRouter>,
        runner: JobRunner,
        options: PipelineOptions,
    ) -> Self {
        let executor = GenerationExecutor::new(
            Arc::clone(&collaborators.jobs),
            Arc::clone(&collaborators.catalog),
            collaborators.storage,
            providers,
            Arc::clone(&router),
            options.fallback_enabled,
        );

        Self {
            ledger: collaborators.ledger,
            jobs: collaborators.jobs,
            costs: CostResolver::new(Arc::clone(&collaborators.catalog), options.pricing.clone()),
            catalog: collaborators.catalog,
            executor,
            router,
            runner,
            refund_on_record_failure: options.pricing.refund_on_record_failure,
        }
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// 创建生成任务, 立即返回 PENDING 记录的 id 与 slug
    #[instrument(skip(self, request), fields(user_id = %request.user_id, kind = %request.kind))]
    pub async fn submit(&self, request: GenerationRequest) -> GenerationResult<JobCreated> {
        request.check()?;

        let resolved = self.costs.resolve(&request).await?;
        self.debit(&request.user_id, resolved.cost).await?;

        let new_job = NewGenerationJob::from_request(&request, generate_slug(&request.prompt));
        let job = match self.jobs.insert(&new_job).await {
            Ok(job) => job,
            Err(err) => {
                self.compensate(&request.user_id, resolved.cost).await;
                return Err(GenerationError::record_store(format!(
                    "创建生成记录失败: {err}"
                )));
            }
        };

        metrics::counter!(JOBS_CREATED_TOTAL).increment(1);
        info!(
            job_id = %job.id,
            slug = %job.slug,
            provider = %resolved.provider,
            model = %resolved.model_path,
            cost = resolved.cost,
            "生成任务已创建"
        );

        self.schedule(job.id, request, resolved);
        Ok(JobCreated::pending(&job))
    }

    fn schedule(&self, job_id: Uuid, request: GenerationRequest, resolved: ResolvedModel) {
        let executor = self.executor.clone();
        self.runner.spawn(job_id, async move {
            executor.execute(job_id, &request, &resolved).await;
        });
    }

    /// 账本的其他错误同样按扣费失败处理, 并带上账本给出的信息
    async fn debit(&self, user_id: &str, amount: i64) -> GenerationResult<()> {
        match self.ledger.debit(user_id, amount).await {
            Ok(()) => Ok(()),
            Err(err @ GenerationError::InsufficientFunds { .. }) => Err(err),
            Err(other) => {
                warn!(user_id, amount, error = %other, "扣费失败");
                Err(GenerationError::insufficient_funds(
                    user_id,
                    amount,
                    other.to_string(),
                ))
            }
        }
    }

    /// 已扣费但记录未写入时退还积分
    async fn compensate(&self, user_id: &str, amount: i64) {
        if !self.refund_on_record_failure || amount == 0 {
            error!(user_id, amount, "生成记录写入失败, 未退款");
            return;
        }
        match self.ledger.credit(user_id, amount).await {
            Ok(()) => warn!(user_id, amount, "生成记录写入失败, 已退还积分"),
            Err(e) => error!(user_id, amount, error = %e, "生成记录写入失败且退款失败, 需人工处理"),
        }
    }

    pub async fn get_job(&self, id: Uuid) -> GenerationResult<GenerationJob> {
        self.jobs
            .get_by_id(id)
            .await?
            .ok_or_else(|| GenerationError::job_not_found(id.to_string()))
    }

    pub async fn get_job_by_slug(&self, slug: &str) -> GenerationResult<GenerationJob> {
        self.jobs
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| GenerationError::job_not_found(slug))
    }

    pub async fn public_feed(&self, page: PageRequest) -> GenerationResult<Page<GenerationJob>> {
        self.jobs.list_completed(page).await
    }

    pub async fn sitemap(&self, limit: Option<i64>) -> GenerationResult<Vec<SitemapEntry>> {
        let limit = limit.unwrap_or(DEFAULT_SITEMAP_LIMIT).clamp(1, MAX_SITEMAP_LIMIT);
        self.jobs.sitemap(limit).await
    }

    pub async fn list_models(&self, kind: Option<ModelKind>) -> GenerationResult<Vec<ModelConfig>> {
        self.catalog.list_active(kind).await
    }

    pub fn cooldowns(&self) -> BTreeMap<String, u64> {
        self.router.cooldown_info()
    }

    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.runner.drain(grace).await
    }
}
