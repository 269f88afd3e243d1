use std::sync::Arc;

use mediagen_config::PricingConfig;
use mediagen_domain::{GenerationRequest, MediaKind, ModelCatalog};
use mediagen_errors::{GenerationError, GenerationResult};
use mediagen_providers::infer_legacy_provider;
use tracing::debug;

/// 计费与后端选择的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    /// 目录中的模型 id; 旧版模型名为 `None`
    pub model_id: Option<String>,
    pub provider: String,
    pub model_path: String,
    pub cost: i64,
}

impl ResolvedModel {
    pub fn from_catalog(&self) -> bool {
        self.model_id.is_some()
    }
}

/// 先按目录 id、再按后端路径查模型; 都查不到时按旧版规则计费
pub struct CostResolver {
    catalog: Arc<dyn ModelCatalog>,
    pricing: PricingConfig,
}

impl CostResolver {
    pub fn new(catalog: Arc<dyn ModelCatalog>, pricing: PricingConfig) -> Self {
        Self { catalog, pricing }
    }

    pub fn legacy_cost(&self, kind: MediaKind) -> i64 {
        match kind {
            MediaKind::Image => self.pricing.legacy_image_cost,
            MediaKind::Video => self.pricing.legacy_video_cost,
        }
    }

    pub async fn resolve(&self, request: &GenerationRequest) -> GenerationResult<ResolvedModel> {
        let reference = request
            .model_reference()
            .ok_or_else(|| GenerationError::validation("必须提供 model_id 或 model"))?;

        let legacy_model = request.model.as_deref().filter(|m| !m.trim().is_empty());
        let mut found = match request.model_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) => self.catalog.get_active_model(id).await?,
            None => None,
        };
        if found.is_none() {
            if let Some(path) = legacy_model {
                found = self.catalog.find_by_path(path).await?;
            }
        }

        if let Some(model) = found {
            debug!(model_id = %model.id, provider = %model.provider, "命中模型目录");
            return Ok(ResolvedModel {
                model_id: Some(model.id.clone()),
                provider: model.provider.clone(),
                model_path: model.api_path.clone(),
                cost: model.cost(),
            });
        }

        // 目录 id 查不到时, 旧版模型名优先作为后端路径
        let model_path = legacy_model.unwrap_or(reference).to_string();
        let provider = infer_legacy_provider(&model_path).to_string();
        debug!(model = %model_path, provider = %provider, "按旧版规则计费");

        Ok(ResolvedModel {
            model_id: None,
            provider,
            model_path,
            cost: self.legacy_cost(request.kind),
        })
    }
}
