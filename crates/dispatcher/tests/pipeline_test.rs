use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;

use mediagen_config::ProvidersConfig;
use mediagen_dispatcher::{
    Collaborators, GenerationPipeline, JobRunner, ModelRouter, PipelineOptions,
};
use mediagen_domain::{JobStatus, MediaStorage, ModelKind, PageRequest};
use mediagen_errors::GenerationError;
use mediagen_providers::{ProviderFactory, ProviderKind};
use mediagen_testing_utils::{
    GenerationRequestBuilder, InMemoryCreditLedger, InMemoryJobRepository, InMemoryMediaStorage,
    InMemoryModelCatalog, ModelConfigBuilder, StubProvider, StubResponse,
};

mock! {
    pub Storage {}

    #[async_trait]
    impl MediaStorage for Storage {
        async fn persist(&self, source: &str, folder: &str) -> String;
    }
}

struct Harness {
    pipeline: GenerationPipeline,
    ledger: InMemoryCreditLedger,
    jobs: InMemoryJobRepository,
    router: Arc<ModelRouter>,
}

async fn harness_with(
    catalog: InMemoryModelCatalog,
    providers: Vec<StubProvider>,
    storage: Arc<dyn MediaStorage>,
) -> Harness {
    let ledger = InMemoryCreditLedger::with_balance("user-1", 500);
    let jobs = InMemoryJobRepository::new();

    let factory = Arc::new(ProviderFactory::new(ProvidersConfig::default()));
    for provider in providers {
        factory.register(Arc::new(provider)).await;
    }

    let router = Arc::new(ModelRouter::new(Duration::from_secs(300)));
    let pipeline = GenerationPipeline::new(
        Collaborators {
            ledger: Arc::new(ledger.clone()),
            jobs: Arc::new(jobs.clone()),
            catalog: Arc::new(catalog),
            storage,
        },
        factory,
        Arc::clone(&router),
        JobRunner::new(4),
        PipelineOptions::default(),
    );

    Harness {
        pipeline,
        ledger,
        jobs,
        router,
    }
}

async fn harness(catalog: InMemoryModelCatalog, providers: Vec<StubProvider>) -> Harness {
    harness_with(catalog, providers, Arc::new(InMemoryMediaStorage::new())).await
}

async fn settle(h: &Harness) {
    assert!(h.pipeline.runner().drain(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_submit_completes_and_persists_result() {
    let catalog = InMemoryModelCatalog::with_models(vec![ModelConfigBuilder::new("m1")
        .with_api_path("fal-ai/m1")
        .with_cost(10)
        .build()]);
    let fal = StubProvider::new(ProviderKind::Batch)
        .respond("fal-ai/m1", StubResponse::url("https://fal.media/out.png"));

    let mut storage = MockStorage::new();
    storage
        .expect_persist()
        .times(1)
        .returning(|source, folder| format!("https://r2.test/{folder}/{}", source.len()));

    let h = harness_with(catalog, vec![fal.clone()], Arc::new(storage)).await;
    let created = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("m1").build())
        .await
        .unwrap();
    assert_eq!(created.status, "pending");
    assert!(created.slug.starts_with("a-red-cube-on-a-table"));
    assert_eq!(h.ledger.balance_of("user-1"), Some(490));

    settle(&h).await;

    let job = h.pipeline.get_job(created.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        job.result_url.as_deref(),
        Some(format!("https://r2.test/generations/{}", "https://fal.media/out.png".len()).as_str())
    );
    assert!(job.completed_at.is_some());
    assert_eq!(fal.calls(), vec!["fal-ai/m1"]);

    let by_slug = h.pipeline.get_job_by_slug(&created.slug).await.unwrap();
    assert_eq!(by_slug.id, job.id);

    let feed = h.pipeline.public_feed(PageRequest::default()).await.unwrap();
    assert_eq!(feed.total, 1);
    assert_eq!(h.pipeline.sitemap(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_backend_failure_marks_job_failed_without_refund() {
    let catalog = InMemoryModelCatalog::with_models(vec![ModelConfigBuilder::new("m1")
        .with_api_path("fal-ai/m1")
        .build()]);
    let fal = StubProvider::new(ProviderKind::Batch)
        .respond("fal-ai/m1", StubResponse::failure("nsfw content detected"));

    let h = harness(catalog, vec![fal]).await;
    let created = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("m1").build())
        .await
        .unwrap();
    settle(&h).await;

    let job = h.pipeline.get_job(created.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("nsfw content detected")));
    assert!(job.result_url.is_none());
    assert_eq!(h.ledger.balance_of("user-1"), Some(490));
    assert_eq!(h.ledger.credit_count(), 0);
    // 普通错误不触发冷却
    assert!(h.pipeline.cooldowns().is_empty());
}

#[tokio::test]
async fn test_rate_limited_backend_puts_model_in_cooldown() {
    let catalog = InMemoryModelCatalog::with_models(vec![ModelConfigBuilder::new("m1")
        .with_api_path("fal-ai/m1")
        .build()]);
    let fal = StubProvider::new(ProviderKind::Batch)
        .respond("fal-ai/m1", StubResponse::rate_limited());

    let h = harness(catalog, vec![fal]).await;
    let created = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("m1").build())
        .await
        .unwrap();
    settle(&h).await;

    let job = h.pipeline.get_job(created.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!h.router.is_model_available("fal-ai/m1"));
    assert!(h.pipeline.cooldowns().contains_key("fal-ai/m1"));
}

#[tokio::test]
async fn test_insufficient_funds_creates_nothing() {
    let fal = StubProvider::new(ProviderKind::Batch);
    let h = harness(InMemoryModelCatalog::new(), vec![fal.clone()]).await;
    h.ledger.set_balance("user-1", 3);

    let err = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model("flux-dev").build())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::InsufficientFunds { amount: 4, .. }));

    settle(&h).await;
    assert_eq!(h.jobs.count(), 0);
    assert_eq!(h.ledger.balance_of("user-1"), Some(3));
    assert!(fal.calls().is_empty());
    assert!(h.pipeline.cooldowns().is_empty());
}

#[tokio::test]
async fn test_ledger_outage_is_reported_as_debit_failure() {
    let h = harness(InMemoryModelCatalog::new(), vec![]).await;
    h.ledger.set_unavailable(true);

    let err = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model("flux-dev").build())
        .await
        .unwrap_err();
    match err {
        GenerationError::InsufficientFunds { reason, .. } => {
            assert!(reason.contains("账本服务不可用"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.jobs.count(), 0);
}

#[tokio::test]
async fn test_validation_runs_before_debit() {
    let h = harness(InMemoryModelCatalog::new(), vec![]).await;

    let err = h
        .pipeline
        .submit(
            GenerationRequestBuilder::new()
                .with_prompt("   ")
                .with_model("flux-dev")
                .build(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Validation(_)));

    let err = h
        .pipeline
        .submit(GenerationRequestBuilder::new().build())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Validation(_)));

    assert_eq!(h.ledger.debit_count(), 0);
    assert_eq!(h.ledger.balance_of("user-1"), Some(500));
}

#[tokio::test]
async fn test_record_failure_refunds_debit() {
    let catalog = InMemoryModelCatalog::with_models(vec![ModelConfigBuilder::new("m1")
        .with_cost(25)
        .build()]);
    let h = harness(catalog, vec![]).await;
    h.jobs.set_fail_inserts(true);

    let err = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("m1").build())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::RecordStore(_)));
    assert_eq!(h.ledger.debit_count(), 1);
    assert_eq!(h.ledger.credit_count(), 1);
    assert_eq!(h.ledger.balance_of("user-1"), Some(500));
}

#[tokio::test]
async fn test_chat_fallback_walks_candidates_by_priority() {
    let catalog = InMemoryModelCatalog::with_models(vec![
        ModelConfigBuilder::new("chat-a")
            .with_provider("OPENROUTER")
            .with_api_path("google/a")
            .with_priority(1)
            .build(),
        ModelConfigBuilder::new("chat-c")
            .with_provider("OPENROUTER")
            .with_api_path("google/c")
            .with_priority(3)
            .build(),
        ModelConfigBuilder::new("chat-b")
            .with_provider("GOOGLE")
            .with_api_path("google/b")
            .with_priority(2)
            .build(),
        // 同类型但不走对话补全, 不在降级链里
        ModelConfigBuilder::new("fal-x")
            .with_api_path("fal-ai/x")
            .with_priority(0)
            .build(),
    ]);
    let chat = StubProvider::new(ProviderKind::Chat)
        .respond("google/a", StubResponse::rate_limited())
        .respond("google/b", StubResponse::failure("upstream 500"))
        .respond("google/c", StubResponse::url("https://openrouter.test/c.png"));

    let h = harness(catalog, vec![chat.clone()]).await;
    let created = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("chat-a").build())
        .await
        .unwrap();
    settle(&h).await;

    let job = h.pipeline.get_job(created.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(chat.calls(), vec!["google/a", "google/b", "google/c"]);

    let cooldowns = h.pipeline.cooldowns();
    assert_eq!(cooldowns.len(), 1);
    assert!(cooldowns.contains_key("google/a"));
}

#[tokio::test]
async fn test_first_two_candidates_cooling_selects_third() {
    let catalog = InMemoryModelCatalog::with_models(vec![
        ModelConfigBuilder::new("chat-a")
            .with_provider("OPENROUTER")
            .with_api_path("google/a")
            .with_priority(1)
            .build(),
        ModelConfigBuilder::new("chat-b")
            .with_provider("OPENROUTER")
            .with_api_path("google/b")
            .with_priority(2)
            .build(),
        ModelConfigBuilder::new("chat-c")
            .with_provider("OPENROUTER")
            .with_api_path("google/c")
            .with_priority(3)
            .build(),
    ]);
    let chat = StubProvider::new(ProviderKind::Chat)
        .with_fallback(StubResponse::url("https://openrouter.test/any.png"));

    let h = harness(catalog, vec![chat.clone()]).await;
    h.pipeline.router().mark_model_failed("google/a");
    h.pipeline.router().mark_model_failed("google/b");

    let created = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("chat-a").build())
        .await
        .unwrap();
    settle(&h).await;

    let job = h.pipeline.get_job(created.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(chat.calls(), vec!["google/c"]);
    assert!(h.pipeline.router().is_model_available("google/c"));
}

#[tokio::test]
async fn test_chat_fallback_exhausted_fails_job() {
    let catalog = InMemoryModelCatalog::with_models(vec![
        ModelConfigBuilder::new("chat-a")
            .with_provider("OPENROUTER")
            .with_api_path("google/a")
            .with_priority(1)
            .build(),
        ModelConfigBuilder::new("chat-b")
            .with_provider("OPENROUTER")
            .with_api_path("google/b")
            .with_priority(2)
            .build(),
    ]);
    let chat = StubProvider::new(ProviderKind::Chat).with_fallback(StubResponse::rate_limited());

    let h = harness(catalog, vec![chat.clone()]).await;
    let created = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("chat-a").build())
        .await
        .unwrap();
    settle(&h).await;

    let job = h.pipeline.get_job(created.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("所有模型暂时不可用")));
    assert_eq!(h.pipeline.cooldowns().len(), 2);

    // 两个模型都在冷却中, 下一次请求不会再调用后端
    let second = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("chat-b").build())
        .await
        .unwrap();
    settle(&h).await;
    assert_eq!(chat.calls().len(), 2);
    let job = h.pipeline.get_job(second.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_panicking_backend_still_finalizes_job() {
    let catalog = InMemoryModelCatalog::with_models(vec![ModelConfigBuilder::new("m1")
        .with_api_path("fal-ai/m1")
        .build()]);
    let fal = StubProvider::new(ProviderKind::Batch).respond("fal-ai/m1", StubResponse::Panic);

    let h = harness(catalog, vec![fal]).await;
    let created = h
        .pipeline
        .submit(GenerationRequestBuilder::new().with_model_id("m1").build())
        .await
        .unwrap();
    settle(&h).await;

    let job = h.pipeline.get_job(created.generation_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(h.jobs.finalize_calls(), 1);
}

#[tokio::test]
async fn test_lookups_report_missing_jobs() {
    let catalog = InMemoryModelCatalog::with_models(vec![
        ModelConfigBuilder::new("img").build(),
        ModelConfigBuilder::new("vid").with_kind(ModelKind::Video).build(),
    ]);
    let h = harness(catalog, vec![]).await;

    let err = h.pipeline.get_job_by_slug("missing").await.unwrap_err();
    assert!(matches!(err, GenerationError::JobNotFound { .. }));

    let videos = h.pipeline.list_models(Some(ModelKind::Video)).await.unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0].id, "vid");
    assert_eq!(h.pipeline.list_models(None).await.unwrap().len(), 2);
}
