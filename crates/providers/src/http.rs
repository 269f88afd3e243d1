use std::time::Duration;

use mediagen_errors::{GenerationError, GenerationResult};
use serde_json::Value;

const MAX_ERROR_BODY_CHARS: usize = 500;

pub(crate) fn build_client(backend: &str, timeout_seconds: u64) -> GenerationResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| GenerationError::config_error(format!("创建 {backend} HTTP 客户端失败: {e}")))
}

/// 缺少密钥时在发出任何请求之前报错
pub(crate) fn require_credential<'a>(
    credential: &'a Option<String>,
    backend: &str,
    env_var: &str,
) -> GenerationResult<&'a str> {
    credential
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GenerationError::config_error(format!("{backend} 未配置密钥 ({env_var})")))
}

pub(crate) fn transport_error(backend: &str, err: reqwest::Error) -> GenerationError {
    match err.status() {
        Some(status) => GenerationError::generation_with_status(
            backend,
            format!("请求失败: {err}"),
            status.as_u16(),
        ),
        None => GenerationError::generation(backend, format!("请求失败: {err}")),
    }
}

/// 非 2xx 响应转为带状态码的生成错误, 正文保留后端给出的错误信息
pub(crate) async fn read_json(response: reqwest::Response, backend: &str) -> GenerationResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(backend, e))?;

    if !status.is_success() {
        return Err(GenerationError::generation_with_status(
            backend,
            format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
            status.as_u16(),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        GenerationError::generation(backend, format!("无法解析响应 JSON: {e}"))
    })
}

fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut short: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    short.push('…');
    short
}
