use std::time::Duration;

use async_trait::async_trait;
use mediagen_config::FalConfig;
use mediagen_errors::{GenerationError, GenerationResult};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::http::{build_client, read_json, require_credential, transport_error};
use crate::params::ParameterResolver;
use crate::provider::{ImageGeneration, Provider, ProviderKind, VideoGeneration};

const BACKEND: &str = "FAL";

/// 队列式批量提交后端
///
/// 提交任务后轮询 `status_url` 直到 `COMPLETED`, 再从 `response_url` 取结果。
pub struct BatchSubmissionProvider {
    client: reqwest::Client,
    config: FalConfig,
    resolver: ParameterResolver,
}

impl BatchSubmissionProvider {
    pub fn new(config: FalConfig, resolver: ParameterResolver) -> GenerationResult<Self> {
        Ok(Self {
            client: build_client(BACKEND, config.request_timeout_seconds)?,
            config,
            resolver,
        })
    }

    /// 不含 `/` 的旧版模型名映射到固定端点
    pub fn image_endpoint(model_path: &str) -> String {
        if model_path.contains('/') {
            return model_path.to_string();
        }
        if model_path == "flux-dev" {
            "fal-ai/flux/dev".to_string()
        } else {
            "fal-ai/flux-pro/v1.1".to_string()
        }
    }

    pub fn video_endpoint(model_path: &str) -> String {
        if !model_path.contains('/') && model_path.contains("hunyuan") {
            return "fal-ai/hunyuan-video".to_string();
        }
        model_path.to_string()
    }

    async fn run(&self, endpoint: &str, arguments: Map<String, Value>) -> GenerationResult<Value> {
        let key = require_credential(&self.config.api_key, BACKEND, "FAL_KEY")?;
        let authorization = format!("Key {key}");
        let submit_url = format!(
            "{}/{}",
            self.config.queue_base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        debug!(endpoint, keys = ?arguments.keys().collect::<Vec<_>>(), "提交队列任务");
        let response = self
            .client
            .post(&submit_url)
            .header(AUTHORIZATION, &authorization)
            .json(&Value::Object(arguments))
            .send()
            .await
            .map_err(|e| transport_error(BACKEND, e))?;
        let submission = read_json(response, BACKEND).await?;

        let request_id = submission.get("request_id").and_then(Value::as_str);
        let status_url = submission
            .get("status_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| request_id.map(|id| format!("{submit_url}/requests/{id}/status")))
            .ok_or_else(|| {
                GenerationError::generation(BACKEND, "提交响应缺少 request_id 与 status_url")
            })?;
        let response_url = submission
            .get("response_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| request_id.map(|id| format!("{submit_url}/requests/{id}")))
            .ok_or_else(|| GenerationError::generation(BACKEND, "提交响应缺少 response_url"))?;

        self.wait_until_completed(&status_url, &authorization).await?;

        let response = self
            .client
            .get(&response_url)
            .header(AUTHORIZATION, &authorization)
            .send()
            .await
            .map_err(|e| transport_error(BACKEND, e))?;
        read_json(response, BACKEND).await
    }

    async fn wait_until_completed(&self, status_url: &str, authorization: &str) -> GenerationResult<()> {
        let deadline = Instant::now() + Duration::from_secs(self.config.max_wait_seconds);
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            let response = self
                .client
                .get(status_url)
                .header(AUTHORIZATION, authorization)
                .send()
                .await
                .map_err(|e| transport_error(BACKEND, e))?;
            let body = read_json(response, BACKEND).await?;
            let status = body.get("status").and_then(Value::as_str).unwrap_or("");

            match status {
                "COMPLETED" => {
                    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
                        return Err(GenerationError::generation(
                            BACKEND,
                            format!("任务执行失败: {}", describe(error)),
                        ));
                    }
                    return Ok(());
                }
                "IN_QUEUE" | "IN_PROGRESS" => {}
                "FAILED" | "ERROR" | "CANCELLED" => {
                    let error = body.get("error").map(describe).unwrap_or_default();
                    return Err(GenerationError::generation(
                        BACKEND,
                        format!("任务状态 {status}: {error}"),
                    ));
                }
                other => debug!(status = other, "未知的队列状态, 继续轮询"),
            }

            if Instant::now() >= deadline {
                return Err(GenerationError::generation(
                    BACKEND,
                    format!("等待结果超时 ({} 秒)", self.config.max_wait_seconds),
                ));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

fn describe(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// 图片结果必须带 `images[0].url`
pub fn extract_image_url(result: &Value) -> GenerationResult<String> {
    result
        .get("images")
        .and_then(|images| images.get(0))
        .and_then(|image| image.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerationError::generation(BACKEND, "后端没有返回图片"))
}

/// 视频结果优先 `video.url`, 其次顶层 `url`
pub fn extract_video_url(result: &Value) -> GenerationResult<String> {
    result
        .get("video")
        .and_then(|video| video.get("url"))
        .and_then(Value::as_str)
        .or_else(|| result.get("url").and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GenerationError::generation(BACKEND, "后端没有返回视频"))
}

#[async_trait]
impl Provider for BatchSubmissionProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Batch
    }

    #[instrument(skip(self, request), fields(model = %request.model_path))]
    async fn generate_image(&self, request: &ImageGeneration) -> GenerationResult<String> {
        let endpoint = Self::image_endpoint(&request.model_path);
        info!(endpoint = %endpoint, "FAL 图片生成");
        let arguments = self.resolver.batch_image(request);
        let result = self.run(&endpoint, arguments).await?;
        extract_image_url(&result)
    }

    #[instrument(skip(self, request), fields(model = %request.model_path))]
    async fn generate_video(&self, request: &VideoGeneration) -> GenerationResult<String> {
        let endpoint = Self::video_endpoint(&request.model_path);
        info!(endpoint = %endpoint, "FAL 视频生成");
        let arguments = self.resolver.batch_video(request);
        let result = self.run(&endpoint, arguments).await?;
        extract_video_url(&result)
    }
}
