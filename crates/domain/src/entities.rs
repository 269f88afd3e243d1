use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mediagen_errors::{GenerationError, GenerationResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// 请求的媒体类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// 未显式指定宽高比时的默认值
    pub fn default_aspect_ratio(&self) -> &'static str {
        match self {
            MediaKind::Image => "1:1",
            MediaKind::Video => "16:9",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生成请求
///
/// 同时兼容两代前端: `model_id` 指向模型目录中的条目, `model` 是旧版的
/// 自由文本模型路径; `aspect_ratio` / `duration` / `resolution` 等旧字段
/// 与 `parameters` 中由模型 schema 描述的动态参数并存。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[validate(custom(function = "validate_prompt"))]
    pub prompt: String,
    #[validate(length(min = 1, message = "user_id 不能为空"))]
    pub user_id: String,
    pub node_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub references: Option<Vec<String>>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default = "default_num_images")]
    #[validate(range(min = 1, message = "num_images 至少为 1"))]
    pub num_images: u32,
}

fn default_num_images() -> u32 {
    1
}

fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::new("prompt_empty").with_message("prompt 不能为空".into()));
    }
    Ok(())
}

impl GenerationRequest {
    pub fn new<P: Into<String>, U: Into<String>>(prompt: P, user_id: U, kind: MediaKind) -> Self {
        Self {
            prompt: prompt.into(),
            user_id: user_id.into(),
            node_id: String::new(),
            project_id: None,
            model_id: None,
            model: None,
            kind,
            parameters: None,
            aspect_ratio: None,
            duration: None,
            references: None,
            resolution: None,
            num_images: 1,
        }
    }

    /// 在产生任何副作用之前校验请求
    pub fn check(&self) -> GenerationResult<()> {
        self.validate().map_err(|errors| {
            let details = errors
                .field_errors()
                .iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| match &e.message {
                        Some(msg) => msg.to_string(),
                        None => format!("{field} 无效"),
                    })
                })
                .collect::<Vec<_>>();
            GenerationError::validation(details.join("; "))
        })?;

        if self.model_reference().is_none() {
            return Err(GenerationError::validation("必须提供 model_id 或 model"));
        }
        Ok(())
    }

    /// 模型引用: 优先目录 id, 其次旧版模型路径; 空白值视为未提供
    pub fn model_reference(&self) -> Option<&str> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|m| !m.trim().is_empty())
        }
        present(&self.model_id).or_else(|| present(&self.model))
    }

    pub fn parameters(&self) -> Map<String, Value> {
        self.parameters.clone().unwrap_or_default()
    }

    pub fn references(&self) -> Vec<String> {
        self.references.clone().unwrap_or_default()
    }

    /// 最终宽高比: 动态参数 > 旧字段 > 按类型默认
    pub fn effective_aspect_ratio(&self) -> String {
        self.parameters
            .as_ref()
            .and_then(|p| p.get("aspect_ratio"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.aspect_ratio.clone().filter(|ar| !ar.is_empty()))
            .unwrap_or_else(|| self.kind.default_aspect_ratio().to_string())
    }

    pub fn effective_duration(&self) -> String {
        self.duration
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "5s".to_string())
    }
}

/// 模型目录中的模型类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ModelKind {
    #[serde(rename = "IMAGE")]
    Image,
    #[serde(rename = "VIDEO")]
    Video,
    #[serde(rename = "CHAT")]
    Chat,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Image => "IMAGE",
            ModelKind::Video => "VIDEO",
            ModelKind::Chat => "CHAT",
        }
    }
}

impl FromStr for ModelKind {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IMAGE" => Ok(ModelKind::Image),
            "VIDEO" => Ok(ModelKind::Video),
            "CHAT" => Ok(ModelKind::Chat),
            other => Err(GenerationError::validation(format!("未知的模型类型: {other}"))),
        }
    }
}

impl From<MediaKind> for ModelKind {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => ModelKind::Image,
            MediaKind::Video => ModelKind::Video,
        }
    }
}

/// 模型参数 schema 中的一项, 由管理后台维护
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub key: String,
    #[serde(default)]
    pub ui: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub constraints: Option<Value>,
}

/// 模型目录条目 (只读)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub provider: String,
    pub api_path: String,
    pub cost_per_gen: i64,
    pub is_active: bool,
    #[serde(default)]
    pub parameter_schema: Vec<ParameterSpec>,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl ModelConfig {
    pub const DEFAULT_PRIORITY: i32 = 999;

    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(Self::DEFAULT_PRIORITY)
    }

    pub fn cost(&self) -> i64 {
        self.cost_per_gen.max(0)
    }
}

/// 生成任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl FromStr for JobStatus {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(GenerationError::Serialization(format!(
                "Invalid job status: {other}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<JobStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 待写入的生成记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGenerationJob {
    pub user_id: String,
    pub project_id: Option<String>,
    pub node_id: Option<String>,
    pub prompt: String,
    pub slug: String,
}

impl NewGenerationJob {
    pub fn from_request(request: &GenerationRequest, slug: String) -> Self {
        Self {
            user_id: request.user_id.clone(),
            project_id: request.project_id.clone(),
            node_id: Some(request.node_id.clone()).filter(|n| !n.is_empty()),
            prompt: request.prompt.clone(),
            slug,
        }
    }
}

/// 生成任务记录
///
/// 状态只能 `PENDING -> COMPLETED` 或 `PENDING -> FAILED`, 终态不可再变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationJob {
    pub id: Uuid,
    pub user_id: String,
    pub project_id: Option<String>,
    pub node_id: Option<String>,
    pub prompt: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub slug: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    pub fn pending(new_job: &NewGenerationJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new_job.user_id.clone(),
            project_id: new_job.project_id.clone(),
            node_id: new_job.node_id.clone(),
            prompt: new_job.prompt.clone(),
            status: JobStatus::Pending,
            result_url: None,
            slug: new_job.slug.clone(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// 应用终态; 非 PENDING 状态下调用返回错误且不修改记录
    pub fn finalize(&mut self, outcome: &JobOutcome) -> GenerationResult<()> {
        if self.is_finished() {
            return Err(GenerationError::Internal(format!(
                "生成记录 {} 已处于终态 {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = outcome.status();
        self.result_url = outcome.result_url().map(str::to_string);
        self.error_message = outcome.error_message().map(str::to_string);
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// 任务的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { result_url: String },
    Failed { error: String },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn result_url(&self) -> Option<&str> {
        match self {
            JobOutcome::Completed { result_url } => Some(result_url),
            JobOutcome::Failed { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            JobOutcome::Completed { .. } => None,
            JobOutcome::Failed { error } => Some(error),
        }
    }
}

/// 创建任务后立即返回给调用方的内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobCreated {
    pub status: String,
    pub generation_id: Uuid,
    pub slug: String,
}

impl JobCreated {
    pub fn pending(job: &GenerationJob) -> Self {
        Self {
            status: "pending".to_string(),
            generation_id: job.id,
            slug: job.slug.clone(),
        }
    }
}

/// 站点地图条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SitemapEntry {
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> GenerationRequest {
        let mut req = GenerationRequest::new("a red cube", "user-1", MediaKind::Image);
        req.model_id = Some("model-1".to_string());
        req
    }

    #[test]
    fn test_request_validation() {
        assert!(request().check().is_ok());

        let mut blank = request();
        blank.prompt = "   ".to_string();
        let err = blank.check().unwrap_err();
        assert!(matches!(err, GenerationError::Validation(ref m) if m.contains("prompt")));

        let mut zero = request();
        zero.num_images = 0;
        assert!(matches!(zero.check(), Err(GenerationError::Validation(_))));

        let mut no_model = request();
        no_model.model_id = None;
        assert!(matches!(no_model.check(), Err(GenerationError::Validation(_))));
    }

    #[test]
    fn test_blank_model_id_falls_back_to_legacy_model() {
        let mut req = request();
        req.model_id = Some("".to_string());
        req.model = Some("flux-dev".to_string());
        assert_eq!(req.model_reference(), Some("flux-dev"));
        assert!(req.check().is_ok());

        req.model_id = Some("   ".to_string());
        assert_eq!(req.model_reference(), Some("flux-dev"));

        req.model = Some(" ".to_string());
        assert_eq!(req.model_reference(), None);
        assert!(matches!(req.check(), Err(GenerationError::Validation(_))));
    }

    #[test]
    fn test_request_deserialization_defaults() {
        let req: GenerationRequest = serde_json::from_value(json!({
            "prompt": "a red cube",
            "user_id": "u1",
            "node_id": "n1",
            "model": "flux-dev"
        }))
        .unwrap();
        assert_eq!(req.kind, MediaKind::Image);
        assert_eq!(req.num_images, 1);
        assert_eq!(req.model_reference(), Some("flux-dev"));

        let bad = serde_json::from_value::<GenerationRequest>(json!({
            "prompt": "x", "user_id": "u1", "node_id": "n1", "type": "audio"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_effective_aspect_ratio() {
        let mut req = request();
        assert_eq!(req.effective_aspect_ratio(), "1:1");

        req.kind = MediaKind::Video;
        assert_eq!(req.effective_aspect_ratio(), "16:9");

        req.aspect_ratio = Some("9:16".to_string());
        assert_eq!(req.effective_aspect_ratio(), "9:16");

        let mut params = Map::new();
        params.insert("aspect_ratio".to_string(), json!("4:3"));
        req.parameters = Some(params);
        assert_eq!(req.effective_aspect_ratio(), "4:3");
    }

    #[test]
    fn test_job_finalize_once() {
        let new_job = NewGenerationJob::from_request(&request(), "a-red-cube-abc123".to_string());
        let mut job = GenerationJob::pending(&new_job);
        assert_eq!(job.status, JobStatus::Pending);

        job.finalize(&JobOutcome::Completed {
            result_url: "https://cdn/x.png".to_string(),
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_url.as_deref(), Some("https://cdn/x.png"));
        assert!(job.completed_at.is_some());

        let again = job.finalize(&JobOutcome::Failed {
            error: "late".to_string(),
        });
        assert!(again.is_err());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("RUNNING".parse::<JobStatus>().is_err());
        assert_eq!("chat".parse::<ModelKind>().unwrap(), ModelKind::Chat);
    }
}
