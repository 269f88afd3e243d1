//! 可编排结果的桩后端

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mediagen_errors::{GenerationError, GenerationResult};
use mediagen_providers::{ImageGeneration, Provider, ProviderKind, VideoGeneration};

/// 单次调用的预设结果
#[derive(Debug, Clone)]
pub enum StubResponse {
    Url(String),
    /// 带状态码的后端错误, 429 会被识别为限流
    Failure { message: String, status: Option<u16> },
    Panic,
}

impl StubResponse {
    pub fn url(url: &str) -> Self {
        StubResponse::Url(url.to_string())
    }

    pub fn rate_limited() -> Self {
        StubResponse::Failure {
            message: "HTTP 429: Too Many Requests".to_string(),
            status: Some(429),
        }
    }

    pub fn failure(message: &str) -> Self {
        StubResponse::Failure {
            message: message.to_string(),
            status: None,
        }
    }
}

/// 按模型路径返回预设结果的后端
///
/// 每个模型的结果按队列依次消费, 队列耗尽后重复最后一个;
/// 没有预设的模型使用 `fallback`。
#[derive(Debug, Clone)]
pub struct StubProvider {
    kind: ProviderKind,
    scripted: Arc<Mutex<HashMap<String, VecDeque<StubResponse>>>>,
    fallback: StubResponse,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            scripted: Arc::new(Mutex::new(HashMap::new())),
            fallback: StubResponse::url("https://backend.test/output.png"),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_fallback(mut self, response: StubResponse) -> Self {
        self.fallback = response;
        self
    }

    pub fn respond(self, model_path: &str, response: StubResponse) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry(model_path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// 按调用顺序记录的模型路径
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn next_response(&self, model_path: &str) -> StubResponse {
        self.calls.lock().unwrap().push(model_path.to_string());
        let mut scripted = self.scripted.lock().unwrap();
        match scripted.get_mut(model_path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(self.fallback.clone()),
            Some(queue) => queue.front().cloned().unwrap_or(self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }

    fn answer(&self, model_path: &str) -> GenerationResult<String> {
        match self.next_response(model_path) {
            StubResponse::Url(url) => Ok(url),
            StubResponse::Failure { message, status } => Err(GenerationError::Generation {
                backend: self.kind.as_str().to_string(),
                message,
                status,
            }),
            StubResponse::Panic => panic!("stub provider panic for {model_path}"),
        }
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn generate_image(&self, request: &ImageGeneration) -> GenerationResult<String> {
        self.answer(&request.model_path)
    }

    async fn generate_video(&self, request: &VideoGeneration) -> GenerationResult<String> {
        self.answer(&request.model_path)
    }
}
