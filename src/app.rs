use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mediagen_api::create_app;
use mediagen_config::AppConfig;
use mediagen_dispatcher::{
    Collaborators, GenerationPipeline, JobRunner, ModelRouter, PipelineOptions,
};
use mediagen_infrastructure::{
    build_storage, DatabaseManager, SqliteCreditLedger, SqliteJobRepository, SqliteModelCatalog,
};
use mediagen_providers::ProviderFactory;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 提供 HTTP 接口并在后台执行生成任务
    Serve,
    /// 只执行数据库迁移后退出
    Migrate,
}

impl AppMode {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "serve" => Ok(AppMode::Serve),
            "migrate" => Ok(AppMode::Migrate),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {mode}")),
        }
    }
}

/// 主应用程序: 组装数据库、对象存储、后端工厂与生成流水线
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    pipeline: Arc<GenerationPipeline>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("初始化数据库失败: {}", config.database.url))?;
        database.migrate().await?;

        let storage = build_storage(&config.storage).context("初始化对象存储失败")?;

        let pool = database.pool().clone();
        let collaborators = Collaborators {
            ledger: Arc::new(SqliteCreditLedger::new(pool.clone())),
            jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
            catalog: Arc::new(SqliteModelCatalog::new(pool)),
            storage,
        };

        let pipeline = Arc::new(GenerationPipeline::new(
            collaborators,
            Arc::new(ProviderFactory::new(config.providers.clone())),
            Arc::new(ModelRouter::from_config(&config.router)),
            JobRunner::from_config(&config.worker),
            PipelineOptions::from_config(&config),
        ));

        Ok(Self {
            config,
            database,
            pipeline,
        })
    }

    /// 只建表, 不启动任何服务
    pub async fn migrate(config: &AppConfig) -> Result<()> {
        let database = DatabaseManager::new(&config.database).await?;
        database.migrate().await?;
        database.close().await;
        Ok(())
    }

    pub fn pipeline(&self) -> Arc<GenerationPipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.config.worker.shutdown_grace_seconds)
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.database
    }

    /// 运行直到收到关闭信号, 然后等待进行中的任务
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.api.enabled {
            let app = create_app(Arc::clone(&self.pipeline), &self.config.api);
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

            info!("API服务器监听: {}", self.config.api.bind_address);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                    info!("API服务器收到关闭信号");
                })
                .await
                .context("API服务器运行失败")?;
        } else {
            warn!("API 已禁用, 等待关闭信号");
            let _ = shutdown_rx.recv().await;
        }

        self.stop().await;
        Ok(())
    }

    async fn stop(&self) {
        let grace = self.shutdown_grace();
        let in_flight = self.pipeline.runner().in_flight();
        if in_flight > 0 {
            info!(in_flight, "等待进行中的生成任务完成");
        }

        if !self.pipeline.shutdown(grace).await {
            warn!(
                in_flight = self.pipeline.runner().in_flight(),
                "等待超时, 仍有生成任务未完成, 它们将保持 PENDING 状态"
            );
        }

        self.database.close().await;
        info!("应用已停止");
    }
}
