use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    generation::{PricingConfig, ProvidersConfig, RouterConfig, StorageConfig},
    server::{ApiConfig, DatabaseConfig, ObservabilityConfig, WorkerConfig},
};
use crate::validation::ConfigValidator;

pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/mediagen.toml",
    "mediagen.toml",
    "/etc/mediagen/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub worker: WorkerConfig,
    pub router: RouterConfig,
    pub pricing: PricingConfig,
    pub storage: StorageConfig,
    pub providers: ProvidersConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载顺序: 配置文件 (或内置默认值) -> `MEDIAGEN_*` 环境变量 -> 后端密钥环境变量
    ///
    /// 嵌套字段用双下划线, 例如 `MEDIAGEN_WORKER__MAX_CONCURRENT_JOBS=16`。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            tracing::debug!("未找到配置文件, 使用内置默认配置");
        }

        builder = builder.add_source(
            Environment::with_prefix("MEDIAGEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.providers.apply_credential_env();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.api.validate()?;
        self.worker.validate()?;
        self.router.validate()?;
        self.pricing.validate()?;
        self.storage.validate()?;
        self.providers.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
