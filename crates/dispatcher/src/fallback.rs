use std::future::Future;
use std::sync::Arc;

use mediagen_domain::ModelConfig;
use mediagen_errors::{GenerationError, GenerationResult};
use tracing::{debug, info, warn};

use crate::router::ModelRouter;

/// 对话类模型的降级链
///
/// 先试请求的模型, 再按优先级依次尝试其他候选, 跳过冷却中的模型。
/// 只有限流/配额类错误会让模型进入冷却。
#[derive(Clone)]
pub struct ChatFallback {
    router: Arc<ModelRouter>,
}

impl ChatFallback {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    /// 尝试顺序: 请求的模型在前, 其余候选按优先级稳定排序, 去重
    pub fn attempt_order(requested: &str, candidates: &[ModelConfig]) -> Vec<String> {
        let mut ranked: Vec<&ModelConfig> = candidates.iter().collect();
        ranked.sort_by_key(|model| model.priority());

        let mut order = vec![requested.to_string()];
        for model in ranked {
            if !order.iter().any(|path| path == &model.api_path) {
                order.push(model.api_path.clone());
            }
        }
        order
    }

    pub async fn run<T, F, Fut>(
        &self,
        requested: &str,
        candidates: &[ModelConfig],
        mut call: F,
    ) -> GenerationResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = GenerationResult<T>>,
    {
        let mut attempted = Vec::new();

        for model in Self::attempt_order(requested, candidates) {
            if !self.router.is_model_available(&model) {
                debug!(model = %model, "模型冷却中, 跳过");
                continue;
            }

            attempted.push(model.clone());
            match call(model.clone()).await {
                Ok(value) => {
                    if model != requested {
                        info!(requested, fallback = %model, "已降级到备用模型");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_rate_limited() => {
                    warn!(model = %model, error = %err, "模型限流, 尝试下一个");
                    self.router.mark_model_failed(&model);
                }
                Err(err) => {
                    warn!(model = %model, error = %err, "模型调用失败, 尝试下一个");
                }
            }
        }

        Err(GenerationError::AllModelsUnavailable {
            attempted,
            cooldowns: self.router.cooldown_info(),
        })
    }
}
