//! 外部协作方的内存实现
//!
//! 用于单元测试与集成测试, 不需要数据库或对象存储。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mediagen_domain::{
    CreditLedger, GenerationJob, JobOutcome, JobRepository, JobStatus, MediaStorage,
    ModelCatalog, ModelConfig, ModelKind, NewGenerationJob, Page, PageRequest, SitemapEntry,
};
use mediagen_errors::{GenerationError, GenerationResult};
use uuid::Uuid;

/// 内存积分账本
#[derive(Debug, Clone, Default)]
pub struct InMemoryCreditLedger {
    balances: Arc<Mutex<HashMap<String, i64>>>,
    unavailable: Arc<AtomicBool>,
    debits: Arc<AtomicUsize>,
    credits: Arc<AtomicUsize>,
}

impl InMemoryCreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(user_id: &str, balance: i64) -> Self {
        let ledger = Self::new();
        ledger.set_balance(user_id, balance);
        ledger
    }

    pub fn set_balance(&self, user_id: &str, balance: i64) {
        self.balances
            .lock()
            .unwrap()
            .insert(user_id.to_string(), balance);
    }

    pub fn balance_of(&self, user_id: &str) -> Option<i64> {
        self.balances.lock().unwrap().get(user_id).copied()
    }

    /// 模拟账本服务不可用: 之后所有调用返回内部错误
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn debit_count(&self) -> usize {
        self.debits.load(Ordering::SeqCst)
    }

    pub fn credit_count(&self) -> usize {
        self.credits.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> GenerationResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GenerationError::Internal("账本服务不可用".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CreditLedger for InMemoryCreditLedger {
    async fn debit(&self, user_id: &str, amount: i64) -> GenerationResult<()> {
        self.check_available()?;
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.get_mut(user_id).ok_or_else(|| {
            GenerationError::insufficient_funds(user_id, amount, "用户不存在")
        })?;
        if *balance < amount {
            return Err(GenerationError::insufficient_funds(
                user_id,
                amount,
                format!("余额 {}", balance),
            ));
        }
        *balance -= amount;
        self.debits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn credit(&self, user_id: &str, amount: i64) -> GenerationResult<()> {
        self.check_available()?;
        let mut balances = self.balances.lock().unwrap();
        *balances.entry(user_id.to_string()).or_insert(0) += amount;
        self.credits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> GenerationResult<Option<i64>> {
        self.check_available()?;
        Ok(self.balance_of(user_id))
    }
}

/// 内存生成记录存储, 终态写入与数据库实现一样是比较后交换
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<Mutex<HashMap<Uuid, GenerationJob>>>,
    fail_inserts: Arc<AtomicBool>,
    finalize_calls: Arc<AtomicUsize>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<GenerationJob>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.jobs.lock().unwrap();
            for job in jobs {
                map.insert(job.id, job);
            }
        }
        repo
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn all_jobs(&self) -> Vec<GenerationJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    fn completed_newest_first(&self) -> Vec<GenerationJob> {
        let mut completed: Vec<_> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.status == JobStatus::Completed)
            .cloned()
            .collect();
        completed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        completed
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &NewGenerationJob) -> GenerationResult<GenerationJob> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(GenerationError::record_store("写入失败 (测试注入)"));
        }
        let created = GenerationJob::pending(job);
        self.jobs
            .lock()
            .unwrap()
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> GenerationResult<bool> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) => Ok(job.finalize(outcome).is_ok()),
            None => Ok(false),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> GenerationResult<Option<GenerationJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> GenerationResult<Option<GenerationJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .find(|job| job.slug == slug)
            .cloned())
    }

    async fn list_completed(&self, page: PageRequest) -> GenerationResult<Page<GenerationJob>> {
        let completed = self.completed_newest_first();
        let total = completed.len() as i64;
        let items = completed
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .collect();
        Ok(Page::new(items, total, page))
    }

    async fn sitemap(&self, limit: i64) -> GenerationResult<Vec<SitemapEntry>> {
        Ok(self
            .completed_newest_first()
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|job| SitemapEntry {
                slug: job.slug,
                created_at: job.created_at,
            })
            .collect())
    }
}

/// 内存模型目录; 只返回启用的模型
#[derive(Debug, Clone, Default)]
pub struct InMemoryModelCatalog {
    models: Arc<Mutex<Vec<ModelConfig>>>,
}

impl InMemoryModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: Vec<ModelConfig>) -> Self {
        Self {
            models: Arc::new(Mutex::new(models)),
        }
    }

    pub fn add(&self, model: ModelConfig) {
        self.models.lock().unwrap().push(model);
    }

    fn find<P: Fn(&ModelConfig) -> bool>(&self, predicate: P) -> Option<ModelConfig> {
        self.models
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.is_active && predicate(m))
            .cloned()
    }
}

#[async_trait]
impl ModelCatalog for InMemoryModelCatalog {
    async fn find_by_id(&self, id: &str) -> GenerationResult<Option<ModelConfig>> {
        Ok(self.find(|m| m.id == id))
    }

    async fn find_by_path(&self, api_path: &str) -> GenerationResult<Option<ModelConfig>> {
        Ok(self.find(|m| m.api_path == api_path))
    }

    async fn list_active(&self, kind: Option<ModelKind>) -> GenerationResult<Vec<ModelConfig>> {
        let mut models: Vec<_> = self
            .models
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.is_active && kind.map_or(true, |k| m.kind == k))
            .cloned()
            .collect();
        models.sort_by(|a, b| a.priority().cmp(&b.priority()).then(a.name.cmp(&b.name)));
        Ok(models)
    }
}

/// 内存对象存储
///
/// 默认返回 `https://cdn.test/{folder}/{n}`; `passthrough()` 原样返回源 URL。
#[derive(Debug, Clone, Default)]
pub struct InMemoryMediaStorage {
    persisted: Arc<Mutex<Vec<(String, String)>>>,
    passthrough: bool,
}

impl InMemoryMediaStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Self::default()
        }
    }

    /// 已转存的 `(源 URL, 目录)`
    pub fn persisted(&self) -> Vec<(String, String)> {
        self.persisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStorage for InMemoryMediaStorage {
    async fn persist(&self, source: &str, folder: &str) -> String {
        let mut persisted = self.persisted.lock().unwrap();
        persisted.push((source.to_string(), folder.to_string()));
        if self.passthrough {
            return source.to_string();
        }
        format!("https://cdn.test/{}/{}", folder, persisted.len())
    }
}
