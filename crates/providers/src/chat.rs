use async_trait::async_trait;
use mediagen_config::OpenRouterConfig;
use mediagen_errors::{GenerationError, GenerationResult};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::AUTHORIZATION;
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use crate::http::{build_client, read_json, require_credential, transport_error};
use crate::params::{ChatArguments, ParameterResolver};
use crate::provider::{ImageGeneration, Provider, ProviderKind, VideoGeneration};

const BACKEND: &str = "OPENROUTER";

static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/[^;]+;base64,[A-Za-z0-9+/=]+").expect("valid data uri regex")
});
static MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[.*?\]\((.*?)\)").expect("valid markdown image regex"));
static BARE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s<>"]+|www\.[^\s<>"]+"#).expect("valid bare url regex")
});

/// 借用对话补全接口出图的后端
///
/// 请求只有一条 user 消息, 扩展参数平铺进请求体。视频请求走同一条图片路径。
pub struct ChatRepurposedProvider {
    client: reqwest::Client,
    config: OpenRouterConfig,
    resolver: ParameterResolver,
}

impl ChatRepurposedProvider {
    pub fn new(config: OpenRouterConfig, resolver: ParameterResolver) -> GenerationResult<Self> {
        Ok(Self {
            client: build_client(BACKEND, config.request_timeout_seconds)?,
            config,
            resolver,
        })
    }

    /// 组装 chat/completions 请求体
    pub fn build_body(prompt: &str, model_path: &str, arguments: &ChatArguments) -> Value {
        let content = if arguments.references.is_empty() {
            json!(prompt)
        } else {
            let mut parts = vec![json!({ "type": "text", "text": prompt })];
            parts.extend(
                arguments
                    .references
                    .iter()
                    .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
            );
            Value::Array(parts)
        };

        let mut body = Map::new();
        body.insert("model".to_string(), json!(model_path));
        body.insert(
            "messages".to_string(),
            json!([{ "role": "user", "content": content }]),
        );
        for (key, value) in arguments.sampling.iter().chain(arguments.extension.iter()) {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body)
    }

    async fn complete(&self, request: &ImageGeneration) -> GenerationResult<String> {
        let key = require_credential(&self.config.api_key, BACKEND, "OPENROUTER_API_KEY")?;
        let arguments = self.resolver.chat(request);
        info!(
            extension_keys = ?arguments.extension.keys().collect::<Vec<_>>(),
            references = arguments.references.len(),
            "OpenRouter 生成"
        );
        let body = Self::build_body(&request.prompt, &request.model_path, &arguments);

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut builder = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .json(&body);
        if let Some(app_url) = &self.config.app_url {
            builder = builder.header("HTTP-Referer", app_url);
        }
        if let Some(app_title) = &self.config.app_title {
            builder = builder.header("X-Title", app_title);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(BACKEND, e))?;
        let completion = read_json(response, BACKEND).await?;
        extract_media_url(&completion)
    }
}

fn structured_url(item: &Value) -> Option<String> {
    item.get("image_url")
        .and_then(|inner| inner.get("url"))
        .or_else(|| item.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// 从补全结果中提取媒体 URL
///
/// 先看结构化的 `images[0]` / `videos[0]`, 再在文本中依次匹配
/// data URI、markdown 图片、裸 URL。
pub fn extract_media_url(completion: &Value) -> GenerationResult<String> {
    let message = completion
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| GenerationError::generation(BACKEND, "响应中没有 choices"))?;

    for field in ["images", "videos"] {
        if let Some(url) = message
            .get(field)
            .and_then(|items| items.get(0))
            .and_then(structured_url)
        {
            return Ok(url);
        }
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| GenerationError::generation(BACKEND, "响应内容为空"))?;

    if let Some(found) = DATA_URI.find(content) {
        return Ok(found.as_str().to_string());
    }
    if let Some(url) = MARKDOWN_IMAGE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|url| !url.is_empty())
    {
        return Ok(url.to_string());
    }
    if let Some(found) = BARE_URL.find(content) {
        return Ok(found.as_str().to_string());
    }

    Err(GenerationError::generation(
        BACKEND,
        "响应中找不到媒体 URL",
    ))
}

#[async_trait]
impl Provider for ChatRepurposedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Chat
    }

    #[instrument(skip(self, request), fields(model = %request.model_path))]
    async fn generate_image(&self, request: &ImageGeneration) -> GenerationResult<String> {
        self.complete(request).await
    }

    #[instrument(skip(self, request), fields(model = %request.model_path))]
    async fn generate_video(&self, request: &VideoGeneration) -> GenerationResult<String> {
        self.complete(&request.as_image()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(message: Value) -> Value {
        json!({ "choices": [{ "message": message }] })
    }

    #[test]
    fn test_extract_structured_images() {
        let nested = completion(json!({
            "content": "",
            "images": [{ "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } }]
        }));
        assert_eq!(extract_media_url(&nested).unwrap(), "data:image/png;base64,AAAA");

        let flat = completion(json!({ "images": [{ "url": "https://cdn/flat.png" }] }));
        assert_eq!(extract_media_url(&flat).unwrap(), "https://cdn/flat.png");

        let video = completion(json!({ "videos": [{ "url": "https://cdn/v.mp4" }] }));
        assert_eq!(extract_media_url(&video).unwrap(), "https://cdn/v.mp4");
    }

    #[test]
    fn test_extract_from_content_in_order() {
        let data_uri = completion(json!({
            "content": "see https://x.com/a.png and data:image/jpeg;base64,/9j/4AAQ=="
        }));
        assert_eq!(
            extract_media_url(&data_uri).unwrap(),
            "data:image/jpeg;base64,/9j/4AAQ=="
        );

        let markdown = completion(json!({
            "content": "Here: ![cube](https://cdn/cube.png) also https://other/x.png"
        }));
        assert_eq!(extract_media_url(&markdown).unwrap(), "https://cdn/cube.png");

        let bare = completion(json!({ "content": "Result at https://cdn/r.png\nenjoy" }));
        assert_eq!(extract_media_url(&bare).unwrap(), "https://cdn/r.png");

        let www = completion(json!({ "content": "go to www.example.com/img.png" }));
        assert_eq!(extract_media_url(&www).unwrap(), "www.example.com/img.png");
    }

    #[test]
    fn test_extract_failures() {
        assert!(extract_media_url(&completion(json!({ "content": "" }))).is_err());
        assert!(extract_media_url(&completion(json!({ "content": "no media here" }))).is_err());
        assert!(extract_media_url(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_build_body_flattens_arguments() {
        let mut arguments = ChatArguments::default();
        arguments.sampling.insert("seed".to_string(), json!(3));
        arguments
            .extension
            .insert("aspect_ratio".to_string(), json!("1:1"));
        arguments
            .extension
            .insert("model".to_string(), json!("should-not-override"));
        arguments.references = vec!["https://ref/1.png".to_string()];

        let body = ChatRepurposedProvider::build_body("a cube", "google/nano-banana", &arguments);
        assert_eq!(body["model"], json!("google/nano-banana"));
        assert_eq!(body["seed"], json!(3));
        assert_eq!(body["aspect_ratio"], json!("1:1"));
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["text"], json!("a cube"));
        assert_eq!(content[1]["image_url"]["url"], json!("https://ref/1.png"));
    }
}
