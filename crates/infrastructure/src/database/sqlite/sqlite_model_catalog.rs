use async_trait::async_trait;
use mediagen_domain::{ModelCatalog, ModelConfig, ModelKind};
use mediagen_errors::GenerationResult;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

const MODEL_COLUMNS: &str =
    "id, name, type, provider, api_path, cost_per_gen, is_active, parameter_schema, priority";

/// 模型目录; 对编排核心只读, `upsert` 供初始化数据与测试使用
pub struct SqliteModelCatalog {
    pool: SqlitePool,
}

impl SqliteModelCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, model), fields(model_id = %model.id))]
    pub async fn upsert(&self, model: &ModelConfig) -> GenerationResult<()> {
        let schema = serde_json::to_string(&model.parameter_schema)?;
        sqlx::query(
            r#"
            INSERT INTO ai_models (id, name, type, provider, api_path, cost_per_gen, is_active, parameter_schema, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                type = excluded.type,
                provider = excluded.provider,
                api_path = excluded.api_path,
                cost_per_gen = excluded.cost_per_gen,
                is_active = excluded.is_active,
                parameter_schema = excluded.parameter_schema,
                priority = excluded.priority
            "#,
        )
        .bind(&model.id)
        .bind(&model.name)
        .bind(model.kind.as_str())
        .bind(&model.provider)
        .bind(&model.api_path)
        .bind(model.cost_per_gen)
        .bind(model.is_active)
        .bind(schema)
        .bind(model.priority)
        .execute(&self.pool)
        .await?;
        debug!("模型目录条目已写入");
        Ok(())
    }

    async fn fetch_one_active(&self, column: &str, value: &str) -> GenerationResult<Option<ModelConfig>> {
        let sql = format!(
            "SELECT {MODEL_COLUMNS} FROM ai_models WHERE {column} = $1 AND is_active = 1 LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(MappingHelpers::row_to_model).transpose()
    }
}

#[async_trait]
impl ModelCatalog for SqliteModelCatalog {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> GenerationResult<Option<ModelConfig>> {
        self.fetch_one_active("id", id).await
    }

    #[instrument(skip(self))]
    async fn find_by_path(&self, api_path: &str) -> GenerationResult<Option<ModelConfig>> {
        self.fetch_one_active("api_path", api_path).await
    }

    #[instrument(skip(self))]
    async fn list_active(&self, kind: Option<ModelKind>) -> GenerationResult<Vec<ModelConfig>> {
        let order = "ORDER BY COALESCE(priority, 999), name";
        let rows = match kind {
            Some(kind) => {
                let sql = format!(
                    "SELECT {MODEL_COLUMNS} FROM ai_models WHERE is_active = 1 AND type = $1 {order}"
                );
                sqlx::query(&sql)
                    .bind(kind.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("SELECT {MODEL_COLUMNS} FROM ai_models WHERE is_active = 1 {order}");
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(MappingHelpers::row_to_model).collect()
    }
}
