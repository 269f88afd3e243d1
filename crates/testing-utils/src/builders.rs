//! 测试数据构建器

use mediagen_domain::{GenerationRequest, MediaKind, ModelConfig, ModelKind};
use serde_json::{Map, Value};

/// 模型目录条目构建器, 默认是启用的 FAL 图片模型
pub struct ModelConfigBuilder {
    model: ModelConfig,
}

impl ModelConfigBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            model: ModelConfig {
                id: id.to_string(),
                name: id.to_string(),
                kind: ModelKind::Image,
                provider: "FAL".to_string(),
                api_path: format!("fal-ai/{id}"),
                cost_per_gen: 10,
                is_active: true,
                parameter_schema: vec![],
                priority: None,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.model.name = name.to_string();
        self
    }

    pub fn with_kind(mut self, kind: ModelKind) -> Self {
        self.model.kind = kind;
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.model.provider = provider.to_string();
        self
    }

    pub fn with_api_path(mut self, api_path: &str) -> Self {
        self.model.api_path = api_path.to_string();
        self
    }

    pub fn with_cost(mut self, cost: i64) -> Self {
        self.model.cost_per_gen = cost;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.model.priority = Some(priority);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.model.is_active = false;
        self
    }

    pub fn build(self) -> ModelConfig {
        self.model
    }
}

/// 生成请求构建器
pub struct GenerationRequestBuilder {
    request: GenerationRequest,
}

impl GenerationRequestBuilder {
    pub fn new() -> Self {
        let mut request = GenerationRequest::new("a red cube on a table", "user-1", MediaKind::Image);
        request.node_id = "node-1".to_string();
        Self { request }
    }

    pub fn image() -> Self {
        Self::new()
    }

    pub fn video() -> Self {
        Self::new().with_kind(MediaKind::Video)
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.request.prompt = prompt.to_string();
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.request.user_id = user_id.to_string();
        self
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.request.kind = kind;
        self
    }

    pub fn with_model_id(mut self, model_id: &str) -> Self {
        self.request.model_id = Some(model_id.to_string());
        self
    }

    /// 旧版自由文本模型路径
    pub fn with_model(mut self, model: &str) -> Self {
        self.request.model = Some(model.to_string());
        self
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.request
            .parameters
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: &str) -> Self {
        self.request.aspect_ratio = Some(aspect_ratio.to_string());
        self
    }

    pub fn with_duration(mut self, duration: &str) -> Self {
        self.request.duration = Some(duration.to_string());
        self
    }

    pub fn with_references(mut self, references: &[&str]) -> Self {
        self.request.references = Some(references.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn with_resolution(mut self, resolution: &str) -> Self {
        self.request.resolution = Some(resolution.to_string());
        self
    }

    pub fn build(self) -> GenerationRequest {
        self.request
    }
}

impl Default for GenerationRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
