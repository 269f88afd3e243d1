use std::time::Duration;

use mediagen_domain::{
    CreditLedger, JobOutcome, JobRepository, JobStatus, ModelCatalog, ModelKind, NewGenerationJob,
    PageRequest, ParameterSpec,
};
use mediagen_errors::GenerationError;
use mediagen_infrastructure::{
    DatabaseManager, SqliteCreditLedger, SqliteJobRepository, SqliteModelCatalog,
};
use mediagen_testing_utils::ModelConfigBuilder;
use serde_json::json;

fn new_job(slug: &str) -> NewGenerationJob {
    NewGenerationJob {
        user_id: "user-1".to_string(),
        project_id: Some("project-1".to_string()),
        node_id: Some("node-1".to_string()),
        prompt: "a red cube".to_string(),
        slug: slug.to_string(),
    }
}

fn completed(url: &str) -> JobOutcome {
    JobOutcome::Completed {
        result_url: url.to_string(),
    }
}

#[tokio::test]
async fn test_job_insert_and_lookup() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let repo = SqliteJobRepository::new(db.pool().clone());

    let job = repo.insert(&new_job("a-red-cube-000001")).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let by_id = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(by_id.slug, "a-red-cube-000001");
    assert_eq!(by_id.project_id.as_deref(), Some("project-1"));
    assert!(by_id.result_url.is_none());

    let by_slug = repo.get_by_slug("a-red-cube-000001").await.unwrap().unwrap();
    assert_eq!(by_slug.id, job.id);
    assert!(repo.get_by_slug("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_slug_is_rejected() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let repo = SqliteJobRepository::new(db.pool().clone());

    repo.insert(&new_job("same-slug")).await.unwrap();
    let err = repo.insert(&new_job("same-slug")).await.unwrap_err();
    assert!(matches!(err, GenerationError::Database(_)));
}

#[tokio::test]
async fn test_finalize_is_compare_and_set() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let repo = SqliteJobRepository::new(db.pool().clone());
    let job = repo.insert(&new_job("cas-000001")).await.unwrap();

    assert!(repo
        .finalize(job.id, &completed("https://cdn.test/1.png"))
        .await
        .unwrap());
    let late = JobOutcome::Failed {
        error: "too late".to_string(),
    };
    assert!(!repo.finalize(job.id, &late).await.unwrap());

    let stored = repo.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result_url.as_deref(), Some("https://cdn.test/1.png"));
    assert!(stored.error_message.is_none());
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn test_feed_and_sitemap_only_show_completed() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let repo = SqliteJobRepository::new(db.pool().clone());

    let first = repo.insert(&new_job("first-000001")).await.unwrap();
    repo.finalize(first.id, &completed("https://cdn.test/1.png"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = repo.insert(&new_job("second-000002")).await.unwrap();
    repo.finalize(second.id, &completed("https://cdn.test/2.png"))
        .await
        .unwrap();

    let failed = repo.insert(&new_job("failed-000003")).await.unwrap();
    repo.finalize(
        failed.id,
        &JobOutcome::Failed {
            error: "boom".to_string(),
        },
    )
    .await
    .unwrap();
    repo.insert(&new_job("pending-000004")).await.unwrap();

    let page = repo.list_completed(PageRequest::new(Some(1), Some(1))).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].slug, "second-000002");

    let sitemap = repo.sitemap(10).await.unwrap();
    let slugs: Vec<_> = sitemap.iter().map(|e| e.slug.as_str()).collect();
    assert_eq!(slugs, vec!["second-000002", "first-000001"]);
    assert_eq!(repo.sitemap(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_model_catalog_lookups() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let catalog = SqliteModelCatalog::new(db.pool().clone());

    let mut flux = ModelConfigBuilder::new("flux")
        .with_api_path("fal-ai/flux/dev")
        .with_cost(5)
        .with_priority(2)
        .build();
    flux.parameter_schema = vec![ParameterSpec {
        key: "guidance_scale".to_string(),
        ui: Some("slider".to_string()),
        default: Some(json!(3.5)),
        constraints: Some(json!({"min": 1, "max": 10})),
    }];
    catalog.upsert(&flux).await.unwrap();
    catalog
        .upsert(&ModelConfigBuilder::new("gemini").with_priority(1).build())
        .await
        .unwrap();
    catalog
        .upsert(
            &ModelConfigBuilder::new("veo")
                .with_kind(ModelKind::Video)
                .with_provider("REPLICATE")
                .build(),
        )
        .await
        .unwrap();
    catalog
        .upsert(&ModelConfigBuilder::new("retired").inactive().build())
        .await
        .unwrap();

    let found = catalog.find_by_id("flux").await.unwrap().unwrap();
    assert_eq!(found, flux);
    let by_path = catalog.get_active_model("fal-ai/flux/dev").await.unwrap().unwrap();
    assert_eq!(by_path.id, "flux");
    assert!(catalog.find_by_id("retired").await.unwrap().is_none());

    let images: Vec<_> = catalog
        .list_active(Some(ModelKind::Image))
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(images, vec!["gemini", "flux"]);
    assert_eq!(catalog.list_active(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_credit_ledger_debit_is_atomic() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let ledger = SqliteCreditLedger::new(db.pool().clone());

    ledger.credit("user-1", 10).await.unwrap();
    ledger.debit("user-1", 4).await.unwrap();
    assert_eq!(ledger.balance("user-1").await.unwrap(), Some(6));

    let err = ledger.debit("user-1", 7).await.unwrap_err();
    match err {
        GenerationError::InsufficientFunds { amount, reason, .. } => {
            assert_eq!(amount, 7);
            assert!(reason.contains('6'));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(ledger.balance("user-1").await.unwrap(), Some(6));

    let err = ledger.debit("nobody", 1).await.unwrap_err();
    assert!(matches!(err, GenerationError::InsufficientFunds { .. }));
    assert!(matches!(
        ledger.credit("user-1", -1).await,
        Err(GenerationError::Validation(_))
    ));
}
