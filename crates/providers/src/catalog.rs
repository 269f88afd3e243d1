use std::time::Duration;

use async_trait::async_trait;
use mediagen_config::ReplicateConfig;
use mediagen_errors::{GenerationError, GenerationResult};
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::http::{build_client, read_json, require_credential, transport_error};
use crate::params::ParameterResolver;
use crate::provider::{ImageGeneration, Provider, ProviderKind, VideoGeneration};

const BACKEND: &str = "REPLICATE";

/// 模型目录式预测后端
///
/// `owner/name` 走模型的 predictions 接口; `owner/name:version` 按版本号创建预测。
/// 创建时带 `Prefer: wait`, 仍未结束的预测按 `urls.get` 轮询。
pub struct CatalogProvider {
    client: reqwest::Client,
    config: ReplicateConfig,
    resolver: ParameterResolver,
}

impl CatalogProvider {
    pub fn new(config: ReplicateConfig, resolver: ParameterResolver) -> GenerationResult<Self> {
        Ok(Self {
            client: build_client(BACKEND, config.request_timeout_seconds)?,
            config,
            resolver,
        })
    }

    async fn run(&self, model_path: &str, input: Map<String, Value>) -> GenerationResult<Value> {
        let token = require_credential(&self.config.api_token, BACKEND, "REPLICATE_API_TOKEN")?;
        let authorization = format!("Bearer {token}");
        let base = self.config.base_url.trim_end_matches('/');

        let (url, body) = match model_path.split_once(':') {
            Some((_, version)) => (
                format!("{base}/predictions"),
                json!({ "version": version, "input": input }),
            ),
            None => (
                format!("{base}/models/{model_path}/predictions"),
                json!({ "input": input }),
            ),
        };

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, &authorization)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(BACKEND, e))?;
        let mut prediction = read_json(response, BACKEND).await?;

        let deadline = Instant::now() + Duration::from_secs(self.config.max_wait_seconds);
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            let status = prediction
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("starting")
                .to_string();

            match status.as_str() {
                "succeeded" => return Ok(prediction.get("output").cloned().unwrap_or(Value::Null)),
                "failed" | "canceled" => {
                    let error = prediction
                        .get("error")
                        .filter(|e| !e.is_null())
                        .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(GenerationError::generation(
                        BACKEND,
                        format!("预测 {status}: {error}"),
                    ));
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(GenerationError::generation(
                    BACKEND,
                    format!("等待预测结果超时 ({} 秒)", self.config.max_wait_seconds),
                ));
            }

            let poll_url = prediction
                .get("urls")
                .and_then(|urls| urls.get("get"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| GenerationError::generation(BACKEND, "预测响应缺少 urls.get"))?;

            debug!(status = %status, "预测未完成, 继续轮询");
            tokio::time::sleep(interval).await;

            let response = self
                .client
                .get(&poll_url)
                .header(AUTHORIZATION, &authorization)
                .send()
                .await
                .map_err(|e| transport_error(BACKEND, e))?;
            prediction = read_json(response, BACKEND).await?;
        }
    }
}

/// 解包预测输出
///
/// 字符串直接返回; 列表取第一个元素; 对象依次查找 `url`、`video`、`output`,
/// 取第一个能解出地址的字段。
pub fn unpack_output(output: &Value) -> GenerationResult<String> {
    extract_url(output, 0)
        .ok_or_else(|| GenerationError::generation(BACKEND, format!("无法识别的输出格式: {output}")))
}

/// 嵌套的对象或列表按同样规则展开, 例如 `{"video": {"url": ...}}`
const MAX_OUTPUT_DEPTH: usize = 4;

fn extract_url(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_OUTPUT_DEPTH {
        return None;
    }
    match value {
        Value::String(url) => Some(url.clone()).filter(|url| !url.is_empty()),
        Value::Array(items) => items.first().and_then(|first| extract_url(first, depth + 1)),
        Value::Object(obj) => ["url", "video", "output"]
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(|inner| extract_url(inner, depth + 1)),
        _ => None,
    }
}

#[async_trait]
impl Provider for CatalogProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Catalog
    }

    #[instrument(skip(self, request), fields(model = %request.model_path))]
    async fn generate_image(&self, request: &ImageGeneration) -> GenerationResult<String> {
        let input = self.resolver.catalog_image(request);
        info!(keys = ?input.keys().collect::<Vec<_>>(), "Replicate 图片生成");
        let output = self.run(&request.model_path, input).await?;
        unpack_output(&output)
    }

    #[instrument(skip(self, request), fields(model = %request.model_path))]
    async fn generate_video(&self, request: &VideoGeneration) -> GenerationResult<String> {
        let input = self.resolver.catalog_video(request);
        info!(keys = ?input.keys().collect::<Vec<_>>(), "Replicate 视频生成");
        let output = self.run(&request.model_path, input).await?;
        unpack_output(&output)
    }
}
