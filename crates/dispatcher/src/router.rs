//! 模型冷却路由
//!
//! 每个后端路径只有两种状态: 可用 / 冷却中。遇到限流类错误的模型进入冷却,
//! 超过冷却窗口后在下一次可用性检查时惰性恢复。表只在进程内存中。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mediagen_config::RouterConfig;
use mediagen_domain::ModelConfig;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::telemetry::MODEL_COOLDOWNS_TOTAL;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

pub struct ModelRouter {
    cooldown: Duration,
    failures: DashMap<String, Instant>,
    clock: Arc<dyn Clock>,
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl ModelRouter {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, Arc::new(SystemClock))
    }

    pub fn with_clock(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown,
            failures: DashMap::new(),
            clock,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(Duration::from_secs(config.cooldown_seconds))
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// 没有失败记录, 或失败已超过冷却窗口; 过期记录在这里移除
    pub fn is_model_available(&self, model_path: &str) -> bool {
        let now = self.clock.now();
        let expired = match self.failures.get(model_path) {
            None => return true,
            Some(failed_at) => now.saturating_duration_since(*failed_at) > self.cooldown,
        };

        if expired {
            self.failures
                .remove_if(model_path, |_, failed_at| {
                    now.saturating_duration_since(*failed_at) > self.cooldown
                });
            debug!(model = model_path, "模型冷却结束");
        }
        expired
    }

    pub fn mark_model_failed(&self, model_path: &str) {
        self.failures.insert(model_path.to_string(), self.clock.now());
        metrics::counter!(MODEL_COOLDOWNS_TOTAL).increment(1);
        warn!(
            model = model_path,
            cooldown_seconds = self.cooldown.as_secs(),
            "模型触发限流, 进入冷却"
        );
    }

    /// 按优先级 (缺省 999, 稳定排序) 返回第一个可用的候选
    pub fn get_next_available_model<'a>(
        &self,
        candidates: &'a [ModelConfig],
    ) -> Option<&'a ModelConfig> {
        let mut ranked: Vec<&ModelConfig> = candidates.iter().collect();
        ranked.sort_by_key(|model| model.priority());
        ranked
            .into_iter()
            .find(|model| self.is_model_available(&model.api_path))
    }

    pub fn remaining_cooldown(&self, model_path: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.failures.get(model_path).and_then(|failed_at| {
            self.cooldown
                .checked_sub(now.saturating_duration_since(*failed_at))
                .filter(|remaining| !remaining.is_zero())
        })
    }

    /// 冷却中的模型 -> 剩余整秒数, 只列出大于 0 的
    pub fn cooldown_info(&self) -> BTreeMap<String, u64> {
        let now = self.clock.now();
        self.failures
            .iter()
            .filter_map(|entry| {
                let elapsed = now.saturating_duration_since(*entry.value());
                let remaining = self.cooldown.checked_sub(elapsed)?.as_secs();
                (remaining > 0).then(|| (entry.key().clone(), remaining))
            })
            .collect()
    }
}
