use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use mediagen_domain::{
    GenerationRequest, JobOutcome, JobRepository, MediaKind, MediaStorage, ModelCatalog,
    ModelConfig, ModelKind,
};
use mediagen_errors::GenerationResult;
use mediagen_providers::{ImageGeneration, Provider, ProviderFactory, ProviderKind, VideoGeneration};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::fallback::ChatFallback;
use crate::pricing::ResolvedModel;
use crate::router::ModelRouter;
use crate::telemetry::{JOBS_COMPLETED_TOTAL, JOBS_FAILED_TOTAL};

/// 生成结果转存时使用的目录
pub const GENERATIONS_FOLDER: &str = "generations";

/// 在后台执行单个生成任务并写入终态
///
/// 任何错误 (包括执行中的 panic) 都会落为 FAILED, 每个任务只写一次终态。
#[derive(Clone)]
pub struct GenerationExecutor {
    jobs: Arc<dyn JobRepository>,
    catalog: Arc<dyn ModelCatalog>,
    storage: Arc<dyn MediaStorage>,
    providers: Arc<ProviderFactory>,
    router: Arc<ModelRouter>,
    fallback_enabled: bool,
}

impl GenerationExecutor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        catalog: Arc<dyn ModelCatalog>,
        storage: Arc<dyn MediaStorage>,
        providers: Arc<ProviderFactory>,
        router: Arc<ModelRouter>,
        fallback_enabled: bool,
    ) -> Self {
        Self {
            jobs,
            catalog,
            storage,
            providers,
            router,
            fallback_enabled,
        }
    }

    #[instrument(
        skip_all,
        fields(job_id = %job_id, provider = %resolved.provider, model = %resolved.model_path)
    )]
    pub async fn execute(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
        resolved: &ResolvedModel,
    ) -> JobOutcome {
        let started = Instant::now();
        let produced = AssertUnwindSafe(self.produce(request, resolved))
            .catch_unwind()
            .await;

        let outcome = match produced {
            Ok(Ok(result_url)) => JobOutcome::Completed { result_url },
            Ok(Err(err)) => {
                if err.is_rate_limited() {
                    self.router.mark_model_failed(&resolved.model_path);
                }
                error!(error = %err, "生成任务失败");
                JobOutcome::Failed {
                    error: err.to_string(),
                }
            }
            Err(_) => {
                error!("生成任务执行异常中止");
                JobOutcome::Failed {
                    error: "内部错误: 生成任务异常中止".to_string(),
                }
            }
        };

        self.finalize(job_id, &outcome).await;
        info!(
            status = outcome.status().as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "生成任务结束"
        );
        outcome
    }

    async fn produce(
        &self,
        request: &GenerationRequest,
        resolved: &ResolvedModel,
    ) -> GenerationResult<String> {
        let temporary_url = self.generate(request, resolved).await?;
        info!("后端生成成功, 开始转存");
        Ok(self.storage.persist(&temporary_url, GENERATIONS_FOLDER).await)
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        resolved: &ResolvedModel,
    ) -> GenerationResult<String> {
        let provider = self.providers.get_provider(&resolved.provider).await?;

        if provider.kind() == ProviderKind::Chat && self.fallback_enabled {
            let candidates = self.chat_candidates(request.kind).await?;
            let fallback = ChatFallback::new(Arc::clone(&self.router));
            return fallback
                .run(&resolved.model_path, &candidates, |model| {
                    let provider = Arc::clone(&provider);
                    async move { invoke(provider.as_ref(), request, &model).await }
                })
                .await;
        }

        invoke(provider.as_ref(), request, &resolved.model_path).await
    }

    /// 同类型、同样走对话补全后端的启用模型
    async fn chat_candidates(&self, kind: MediaKind) -> GenerationResult<Vec<ModelConfig>> {
        let models = self.catalog.list_active(Some(ModelKind::from(kind))).await?;
        Ok(models
            .into_iter()
            .filter(|model| ProviderKind::from_identifier(&model.provider) == Some(ProviderKind::Chat))
            .collect())
    }

    async fn finalize(&self, job_id: Uuid, outcome: &JobOutcome) {
        match self.jobs.finalize(job_id, outcome).await {
            Ok(true) => {
                let counter = match outcome {
                    JobOutcome::Completed { .. } => JOBS_COMPLETED_TOTAL,
                    JobOutcome::Failed { .. } => JOBS_FAILED_TOTAL,
                };
                metrics::counter!(counter).increment(1);
            }
            Ok(false) => warn!("生成记录已处于终态, 忽略本次结果"),
            Err(e) => error!(error = %e, "写入生成记录终态失败"),
        }
    }
}

async fn invoke(
    provider: &dyn Provider,
    request: &GenerationRequest,
    model_path: &str,
) -> GenerationResult<String> {
    match request.kind {
        MediaKind::Image => {
            provider
                .generate_image(&ImageGeneration::from_request(request, model_path))
                .await
        }
        MediaKind::Video => {
            provider
                .generate_video(&VideoGeneration::from_request(request, model_path))
                .await
        }
    }
}
