use std::fmt;

use async_trait::async_trait;
use mediagen_domain::{GenerationRequest, MediaKind};
use mediagen_errors::GenerationResult;
use serde_json::{Map, Value};

/// 后端种类 (封闭集合)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// 队列式批量提交 (FAL)
    Batch,
    /// 模型目录式预测 (Replicate)
    Catalog,
    /// 借用对话补全接口 (OpenRouter)
    Chat,
}

impl ProviderKind {
    /// 按提供方标识解析, 大小写不敏感; `GOOGLE` 走对话补全后端
    pub fn from_identifier(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "FAL" => Some(ProviderKind::Batch),
            "REPLICATE" => Some(ProviderKind::Catalog),
            "OPENROUTER" | "GOOGLE" => Some(ProviderKind::Chat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Batch => "FAL",
            ProviderKind::Catalog => "REPLICATE",
            ProviderKind::Chat => "OPENROUTER",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次图片生成调用的全部输入
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeneration {
    pub prompt: String,
    pub model_path: String,
    pub aspect_ratio: String,
    pub references: Vec<String>,
    pub parameters: Map<String, Value>,
    pub resolution: Option<String>,
    pub num_images: u32,
}

impl ImageGeneration {
    pub fn new<P: Into<String>, M: Into<String>>(prompt: P, model_path: M) -> Self {
        Self {
            prompt: prompt.into(),
            model_path: model_path.into(),
            aspect_ratio: MediaKind::Image.default_aspect_ratio().to_string(),
            references: Vec::new(),
            parameters: Map::new(),
            resolution: None,
            num_images: 1,
        }
    }

    pub fn from_request(request: &GenerationRequest, model_path: &str) -> Self {
        Self {
            prompt: request.prompt.clone(),
            model_path: model_path.to_string(),
            aspect_ratio: request.effective_aspect_ratio(),
            references: request.references(),
            parameters: request.parameters(),
            resolution: request.resolution.clone().filter(|r| !r.trim().is_empty()),
            num_images: request.num_images.max(1),
        }
    }

    /// 以另一个模型重放同一请求, 用于对话模型降级
    pub fn with_model(&self, model_path: &str) -> Self {
        Self {
            model_path: model_path.to_string(),
            ..self.clone()
        }
    }
}

/// 一次视频生成调用的全部输入
#[derive(Debug, Clone, PartialEq)]
pub struct VideoGeneration {
    pub prompt: String,
    pub model_path: String,
    pub duration: String,
    pub aspect_ratio: String,
    pub references: Vec<String>,
    pub parameters: Map<String, Value>,
}

impl VideoGeneration {
    pub fn new<P: Into<String>, M: Into<String>>(prompt: P, model_path: M) -> Self {
        Self {
            prompt: prompt.into(),
            model_path: model_path.into(),
            duration: "5s".to_string(),
            aspect_ratio: MediaKind::Video.default_aspect_ratio().to_string(),
            references: Vec::new(),
            parameters: Map::new(),
        }
    }

    pub fn from_request(request: &GenerationRequest, model_path: &str) -> Self {
        Self {
            prompt: request.prompt.clone(),
            model_path: model_path.to_string(),
            duration: request.effective_duration(),
            aspect_ratio: request.effective_aspect_ratio(),
            references: request.references(),
            parameters: request.parameters(),
        }
    }

    pub fn with_model(&self, model_path: &str) -> Self {
        Self {
            model_path: model_path.to_string(),
            ..self.clone()
        }
    }

    /// 视频请求降级为图片路径时使用 (对话补全后端)
    pub fn as_image(&self) -> ImageGeneration {
        ImageGeneration {
            prompt: self.prompt.clone(),
            model_path: self.model_path.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            references: self.references.clone(),
            parameters: self.parameters.clone(),
            resolution: None,
            num_images: 1,
        }
    }
}

/// 生成后端
///
/// 成功时返回结果媒体的 URL (也可能是 data URI)。实现不做重试,
/// 也不持有按调用变化的可变状态, 可以在多个任务间共享。
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn generate_image(&self, request: &ImageGeneration) -> GenerationResult<String>;

    async fn generate_video(&self, request: &VideoGeneration) -> GenerationResult<String>;
}
