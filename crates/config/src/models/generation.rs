use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

/// 模型冷却与对话类模型的自动降级
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub cooldown_seconds: u64,
    pub fallback_enabled: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
            fallback_enabled: true,
        }
    }
}

impl ConfigValidator for RouterConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(self.cooldown_seconds, "router.cooldown_seconds")
    }
}

/// 模型目录中找不到模型时使用的旧版计费
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub legacy_image_cost: i64,
    pub legacy_video_cost: i64,
    /// 扣费成功但写入记录失败时是否退款
    pub refund_on_record_failure: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            legacy_image_cost: 4,
            legacy_video_cost: 160,
            refund_on_record_failure: true,
        }
    }
}

impl ConfigValidator for PricingConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_non_negative(self.legacy_image_cost, "pricing.legacy_image_cost")?;
        ValidationUtils::validate_non_negative(self.legacy_video_cost, "pricing.legacy_video_cost")?;
        Ok(())
    }
}

/// S3 兼容的对象存储; 未配置 endpoint 时结果 URL 原样保存
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub access_token: Option<String>,
    pub public_domain: Option<String>,
    pub download_timeout_seconds: Option<u64>,
}

impl StorageConfig {
    pub fn is_configured(&self) -> bool {
        self.endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty())
            && !self.bucket.trim().is_empty()
    }

    pub fn download_timeout(&self) -> u64 {
        self.download_timeout_seconds.unwrap_or(60)
    }
}

impl ConfigValidator for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            ValidationUtils::validate_url(endpoint, "storage.endpoint")?;
            ValidationUtils::validate_not_empty(&self.bucket, "storage.bucket")?;
        }
        if let Some(domain) = &self.public_domain {
            ValidationUtils::validate_url(domain, "storage.public_domain")?;
        }
        ValidationUtils::validate_timeout_seconds(
            self.download_timeout(),
            "storage.download_timeout_seconds",
        )?;
        Ok(())
    }
}

/// 队列式批量提交后端
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FalConfig {
    pub api_key: Option<String>,
    pub queue_base_url: String,
    pub poll_interval_ms: u64,
    pub max_wait_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            queue_base_url: "https://queue.fal.run".to_string(),
            poll_interval_ms: 1000,
            max_wait_seconds: 600,
            request_timeout_seconds: 60,
        }
    }
}

/// 模型目录式预测后端
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateConfig {
    pub api_token: Option<String>,
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub max_wait_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: "https://api.replicate.com/v1".to_string(),
            poll_interval_ms: 1000,
            max_wait_seconds: 600,
            request_timeout_seconds: 60,
        }
    }
}

/// 借用对话补全接口出图的后端
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub app_url: Option<String>,
    pub app_title: Option<String>,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            request_timeout_seconds: 60,
            app_url: None,
            app_title: Some("mediagen".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub fal: FalConfig,
    pub replicate: ReplicateConfig,
    pub openrouter: OpenRouterConfig,
    /// 后端路径包含其中任一标记时按多参考图模型处理
    pub multi_reference_markers: Vec<String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            fal: FalConfig::default(),
            replicate: ReplicateConfig::default(),
            openrouter: OpenRouterConfig::default(),
            multi_reference_markers: vec!["nano-banana".to_string(), "multi-image".to_string()],
        }
    }
}

impl ProvidersConfig {
    /// 配置文件未给出密钥时读取各后端约定俗成的环境变量
    pub fn apply_credential_env(&mut self) {
        fill_from_env(&mut self.fal.api_key, "FAL_KEY");
        fill_from_env(&mut self.replicate.api_token, "REPLICATE_API_TOKEN");
        fill_from_env(&mut self.openrouter.api_key, "OPENROUTER_API_KEY");
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if slot.as_deref().is_some_and(|v| !v.trim().is_empty()) {
        return;
    }
    if let Ok(value) = std::env::var(var) {
        if !value.trim().is_empty() {
            *slot = Some(value);
        }
    }
}

impl ConfigValidator for ProvidersConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_url(&self.fal.queue_base_url, "providers.fal.queue_base_url")?;
        ValidationUtils::validate_url(&self.replicate.base_url, "providers.replicate.base_url")?;
        ValidationUtils::validate_url(&self.openrouter.base_url, "providers.openrouter.base_url")?;

        for (interval, field) in [
            (self.fal.poll_interval_ms, "providers.fal.poll_interval_ms"),
            (
                self.replicate.poll_interval_ms,
                "providers.replicate.poll_interval_ms",
            ),
        ] {
            if interval == 0 {
                return Err(ConfigError::Validation(format!(
                    "{field} must be greater than 0"
                )));
            }
        }

        ValidationUtils::validate_timeout_seconds(
            self.fal.max_wait_seconds,
            "providers.fal.max_wait_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.replicate.max_wait_seconds,
            "providers.replicate.max_wait_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.fal.request_timeout_seconds,
            "providers.fal.request_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.replicate.request_timeout_seconds,
            "providers.replicate.request_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.openrouter.request_timeout_seconds,
            "providers.openrouter.request_timeout_seconds",
        )?;

        if self
            .multi_reference_markers
            .iter()
            .any(|m| m.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "providers.multi_reference_markers cannot contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_defaults() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.legacy_image_cost, 4);
        assert_eq!(pricing.legacy_video_cost, 160);
        assert!(pricing.refund_on_record_failure);

        let negative = PricingConfig {
            legacy_image_cost: -1,
            ..PricingConfig::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_storage_configured() {
        let mut storage = StorageConfig::default();
        assert!(!storage.is_configured());
        assert!(storage.validate().is_ok());

        storage.endpoint = Some("https://s3.example.com".to_string());
        assert!(!storage.is_configured());
        assert!(storage.validate().is_err());

        storage.bucket = "media".to_string();
        assert!(storage.is_configured());
        assert!(storage.validate().is_ok());
    }

    #[test]
    fn test_providers_validation() {
        let mut providers = ProvidersConfig::default();
        assert!(providers.validate().is_ok());

        providers.fal.poll_interval_ms = 0;
        assert!(providers.validate().is_err());

        let mut providers = ProvidersConfig::default();
        providers.openrouter.base_url = "openrouter.ai".to_string();
        assert!(providers.validate().is_err());
    }

    #[test]
    fn test_explicit_credentials_are_kept() {
        let mut providers = ProvidersConfig::default();
        providers.fal.api_key = Some("from-file".to_string());
        providers.apply_credential_env();
        assert_eq!(providers.fal.api_key.as_deref(), Some("from-file"));
    }
}
