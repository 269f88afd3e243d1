use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use mediagen_config::StorageConfig;
use mediagen_domain::MediaStorage;
use mediagen_errors::{GenerationError, GenerationResult};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::STORAGE_FALLBACK_TOTAL;

const BACKEND: &str = "storage";

/// 待上传的媒体内容
#[derive(Debug, PartialEq)]
pub(crate) struct MediaPayload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl MediaPayload {
    /// 视频存为 mp4, jpeg 存为 jpg, 其余按 png 处理
    pub fn extension(&self) -> &'static str {
        let content_type = self.content_type.to_lowercase();
        if content_type.starts_with("video/") {
            "mp4"
        } else if content_type == "image/jpeg" || content_type == "image/jpg" {
            "jpg"
        } else {
            "png"
        }
    }
}

/// 解析 `data:<mime>;base64,<payload>`; 不是 data URI 时返回 `None`
pub(crate) fn decode_data_uri(source: &str) -> Option<GenerationResult<MediaPayload>> {
    source.strip_prefix("data:").map(parse_data_uri)
}

fn parse_data_uri(rest: &str) -> GenerationResult<MediaPayload> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| GenerationError::StorageDegraded("data URI 缺少数据部分".to_string()))?;
    let content_type = header.strip_suffix(";base64").ok_or_else(|| {
        GenerationError::StorageDegraded("仅支持 base64 编码的 data URI".to_string())
    })?;
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| GenerationError::StorageDegraded(format!("base64 解码失败: {e}")))?;
    Ok(MediaPayload {
        bytes,
        content_type: if content_type.is_empty() {
            "image/png".to_string()
        } else {
            content_type.to_string()
        },
    })
}

/// S3 兼容对象存储 (按 `PUT {endpoint}/{bucket}/{key}` 上传)
pub struct HttpObjectStorage {
    client: Client,
    config: StorageConfig,
}

impl HttpObjectStorage {
    pub fn new(config: StorageConfig) -> GenerationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout()))
            .build()
            .map_err(|e| GenerationError::config_error(format!("创建存储 HTTP 客户端失败: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> GenerationResult<&str> {
        self.config
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| GenerationError::config_error("未配置 storage.endpoint"))
    }

    pub fn public_url(&self, key: &str) -> GenerationResult<String> {
        match self.config.public_domain.as_deref().filter(|d| !d.is_empty()) {
            Some(domain) => Ok(format!("{}/{}", domain.trim_end_matches('/'), key)),
            None => Ok(format!("{}/{}/{}", self.endpoint()?, self.config.bucket, key)),
        }
    }

    async fn load(&self, source: &str) -> GenerationResult<MediaPayload> {
        if let Some(decoded) = decode_data_uri(source) {
            return decoded;
        }
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            return Err(GenerationError::StorageDegraded(format!(
                "无法识别的结果地址: {source}"
            )));
        }

        let response = self.client.get(source).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::StorageDegraded(format!(
                "下载生成结果失败: HTTP {}",
                status.as_u16()
            )));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok(MediaPayload {
            bytes,
            content_type,
        })
    }

    async fn upload(&self, key: &str, payload: MediaPayload) -> GenerationResult<()> {
        let url = format!("{}/{}/{}", self.endpoint()?, self.config.bucket, key);
        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, payload.content_type)
            .body(payload.bytes);
        if let Some(token) = self.config.access_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::generation_with_status(
                BACKEND,
                format!("上传失败: {}", body.chars().take(200).collect::<String>()),
                status.as_u16(),
            ));
        }
        Ok(())
    }

    async fn try_persist(&self, source: &str, folder: &str) -> GenerationResult<String> {
        let payload = self.load(source).await?;
        let key = format!(
            "{}/{}.{}",
            folder.trim_matches('/'),
            Uuid::new_v4(),
            payload.extension()
        );
        debug!(key = %key, bytes = payload.bytes.len(), "开始上传生成结果");
        self.upload(&key, payload).await?;
        self.public_url(&key)
    }
}

#[async_trait]
impl MediaStorage for HttpObjectStorage {
    #[instrument(skip(self, source), fields(folder = folder))]
    async fn persist(&self, source: &str, folder: &str) -> String {
        match self.try_persist(source, folder).await {
            Ok(url) => {
                info!(url = %url, "生成结果已转存");
                url
            }
            Err(err) => {
                let degraded = match err {
                    GenerationError::StorageDegraded(_) => err,
                    other => GenerationError::StorageDegraded(other.to_string()),
                };
                metrics::counter!(STORAGE_FALLBACK_TOTAL).increment(1);
                warn!(error = %degraded, "转存失败, 保留原始 URL");
                source.to_string()
            }
        }
    }
}
