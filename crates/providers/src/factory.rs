use std::collections::HashMap;
use std::sync::Arc;

use mediagen_config::ProvidersConfig;
use mediagen_errors::GenerationResult;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::batch::BatchSubmissionProvider;
use crate::catalog::CatalogProvider;
use crate::chat::ChatRepurposedProvider;
use crate::params::ParameterResolver;
use crate::provider::{Provider, ProviderKind};

/// 按提供方标识返回共享的后端实例
///
/// 每种后端只构造一次, 在工厂生命周期内缓存。
pub struct ProviderFactory {
    config: ProvidersConfig,
    resolver: ParameterResolver,
    registry: Arc<RwLock<HashMap<ProviderKind, Arc<dyn Provider>>>>,
}

impl ProviderFactory {
    pub fn new(config: ProvidersConfig) -> Self {
        let resolver = ParameterResolver::new(config.multi_reference_markers.clone());
        Self {
            config,
            resolver,
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 提前放入一个实例, 之后同种类的请求都返回它
    pub async fn register(&self, provider: Arc<dyn Provider>) {
        let kind = provider.kind();
        self.registry.write().await.insert(kind, provider);
        info!(provider = %kind, "已注册生成后端");
    }

    /// 大小写不敏感; 未知标识回退到队列式后端
    pub fn resolve_kind(name: &str) -> ProviderKind {
        ProviderKind::from_identifier(name).unwrap_or_else(|| {
            warn!(provider = name, "未知的提供方, 回退到 FAL");
            ProviderKind::Batch
        })
    }

    pub async fn get_provider(&self, name: &str) -> GenerationResult<Arc<dyn Provider>> {
        let kind = Self::resolve_kind(name);

        if let Some(provider) = self.registry.read().await.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let mut registry = self.registry.write().await;
        // 等待写锁期间可能已被其他任务创建
        if let Some(provider) = registry.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let provider = self.create_provider(kind)?;
        registry.insert(kind, Arc::clone(&provider));
        info!(provider = %kind, "已创建生成后端");
        Ok(provider)
    }

    fn create_provider(&self, kind: ProviderKind) -> GenerationResult<Arc<dyn Provider>> {
        let resolver = self.resolver.clone();
        let provider: Arc<dyn Provider> = match kind {
            ProviderKind::Batch => Arc::new(BatchSubmissionProvider::new(
                self.config.fal.clone(),
                resolver,
            )?),
            ProviderKind::Catalog => Arc::new(CatalogProvider::new(
                self.config.replicate.clone(),
                resolver,
            )?),
            ProviderKind::Chat => Arc::new(ChatRepurposedProvider::new(
                self.config.openrouter.clone(),
                resolver,
            )?),
        };
        Ok(provider)
    }
}

/// 目录中没有模型时按旧版模型名推断提供方
///
/// 包含 `kling` 或 `veo` 且不含 `fal` 的走 REPLICATE, 其余走 FAL。
pub fn infer_legacy_provider(model: &str) -> &'static str {
    let lowered = model.to_lowercase();
    if (lowered.contains("kling") || lowered.contains("veo")) && !lowered.contains("fal") {
        ProviderKind::Catalog.as_str()
    } else {
        ProviderKind::Batch.as_str()
    }
}
