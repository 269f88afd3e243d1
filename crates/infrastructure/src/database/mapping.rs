//! 行与实体之间的转换

use chrono::{DateTime, Utc};
use mediagen_domain::{GenerationJob, JobStatus, ModelConfig, ModelKind, ParameterSpec};
use mediagen_errors::{GenerationError, GenerationResult};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn parse_uuid(row: &SqliteRow, field_name: &str) -> GenerationResult<Uuid> {
        let raw: String = row.try_get(field_name)?;
        Uuid::parse_str(&raw)
            .map_err(|e| GenerationError::Serialization(format!("解析记录 id 失败: {e}")))
    }

    /// 模型参数 schema 以 JSON 文本保存; 空值视为空列表
    pub fn parse_parameter_schema(
        row: &SqliteRow,
        field_name: &str,
    ) -> GenerationResult<Vec<ParameterSpec>> {
        match row.try_get::<Option<String>, _>(field_name)? {
            Some(json_str) if !json_str.trim().is_empty() => serde_json::from_str(&json_str)
                .map_err(|e| GenerationError::Serialization(format!("解析参数 schema 失败: {e}"))),
            _ => Ok(Vec::new()),
        }
    }

    pub fn row_to_job(row: &SqliteRow) -> GenerationResult<GenerationJob> {
        let status: JobStatus = row.try_get("status")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(GenerationJob {
            id: Self::parse_uuid(row, "id")?,
            user_id: row.try_get("user_id")?,
            project_id: row.try_get("project_id")?,
            node_id: row.try_get("node_id")?,
            prompt: row.try_get("prompt")?,
            status,
            result_url: row.try_get("result_url")?,
            slug: row.try_get("slug")?,
            error_message: row.try_get("error_message")?,
            created_at,
            completed_at: row.try_get("completed_at")?,
        })
    }

    pub fn row_to_model(row: &SqliteRow) -> GenerationResult<ModelConfig> {
        let kind: String = row.try_get("type")?;
        Ok(ModelConfig {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: kind.parse::<ModelKind>()?,
            provider: row.try_get("provider")?,
            api_path: row.try_get("api_path")?,
            cost_per_gen: row.try_get("cost_per_gen")?,
            is_active: row.try_get("is_active")?,
            parameter_schema: Self::parse_parameter_schema(row, "parameter_schema")?,
            priority: row.try_get("priority")?,
        })
    }
}
